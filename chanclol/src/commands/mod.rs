pub mod check;
pub mod command;
pub mod run;
