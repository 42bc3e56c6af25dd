#![allow(non_snake_case)]

pub mod Guild;
pub mod GuildPlayer;
pub mod Player;
pub mod RiotIdRecord;
