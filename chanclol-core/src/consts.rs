use std::time::Duration;

/// Added to every computed admission wait so a retry lands past the window edge
pub const ADMISSION_SAFETY_MARGIN: Duration = Duration::from_millis(100);
pub const MIN_ADMISSION_WAIT: Duration = Duration::from_millis(1);

/// How many times a vital request is re-admitted after the remote reports throttling
pub const MAX_THROTTLED_RETRIES: usize = 3;

pub const COMMAND_PREFIX: &str = "chanclol";

pub const RIOT_TOKEN_HEADER: &str = "X-Riot-Token";

pub const QUEUE_RANKED_SOLO: &str = "RANKED_SOLO_5x5";
pub const QUEUE_RANKED_FLEX: &str = "RANKED_FLEX_SR";
