use chrono::NaiveTime;
use once_cell::sync::Lazy;
use regex::Regex;

static LOGIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\[(?P<time>\d{2}:\d{2}:\d{2})\] \[Server thread/INFO\]: (?P<player>[A-Za-z0-9_]+)\[/.*\] logged in",
    )
    .unwrap()
});
static LEAVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\[(?P<time>\d{2}:\d{2}:\d{2})\] \[Server thread/INFO\]: (?P<player>[A-Za-z0-9_]+) (?:left the game|lost connection: .*)",
    )
    .unwrap()
});
static ADVANCEMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\[\d{2}:\d{2}:\d{2}\] \[Server thread/INFO\]: (?P<player>[A-Za-z0-9_]+) has made the advancement \[(?P<advancement>.+?)\]",
    )
    .unwrap()
});
static PLAYER_DEATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"\[\d{2}:\d{2}:\d{2}\] \[Server thread/INFO\]: (?P<player>[A-Za-z0-9_]+) (?P<cause>",
        r"fell from a high place|fell off a ladder|fell out of the world|hit the ground too hard|",
        r"was slain by .+|was shot by .+|was blown up by .+|was doomed to fall by .+|was killed by .+|",
        r"burned to death|tried to swim in lava|drowned|experienced kinetic energy|blew up|",
        r"withered away|starved to death|died",
        r")",
    ))
    .unwrap()
});
static VILLAGER_DEATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\[\d{2}:\d{2}:\d{2}\] \[Server thread/INFO\]: (?:Named entity|Villager) .* died[:,] (?:message:\s*)?'?(?P<message>.+?)'?$",
    )
    .unwrap()
});
static KILLER: Lazy<Regex> = Lazy::new(|| Regex::new(r" by ([A-Za-z0-9_]+)$").unwrap());
static VICTIM_CAUSE: Lazy<Regex> = Lazy::new(|| Regex::new(r".+? (was .+)").unwrap());

/// One line of a server log that the log stats care about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogEvent {
    Login { player: String, time: NaiveTime },
    /// Either "left the game" or "lost connection", often both in a row.
    Leave { player: String, time: NaiveTime },
    Advancement { player: String },
    PlayerDeath { player: String, cause: String },
    VillagerDeath { killer: Option<String>, cause: String },
}

impl LogEvent {
    /// First matching event on the line, tried in the order of the variants.
    pub fn parse(line: &str) -> Option<LogEvent> {
        let line = line.trim_end();

        if let Some(caps) = LOGIN.captures(line) {
            return Some(LogEvent::Login {
                player: caps["player"].to_string(),
                time: parse_time(&caps["time"])?,
            });
        }
        if let Some(caps) = LEAVE.captures(line) {
            return Some(LogEvent::Leave {
                player: caps["player"].to_string(),
                time: parse_time(&caps["time"])?,
            });
        }
        if let Some(caps) = ADVANCEMENT.captures(line) {
            return Some(LogEvent::Advancement {
                player: caps["player"].to_string(),
            });
        }
        if let Some(caps) = PLAYER_DEATH.captures(line) {
            return Some(LogEvent::PlayerDeath {
                player: caps["player"].to_string(),
                cause: caps["cause"].to_string(),
            });
        }
        if let Some(caps) = VILLAGER_DEATH.captures(line) {
            let message = &caps["message"];
            let killer = KILLER.captures(message).map(|k| k[1].to_string());
            let cause = VICTIM_CAUSE
                .captures(message)
                .map(|c| c[1].to_string())
                .unwrap_or_else(|| message.to_string());
            return Some(LogEvent::VillagerDeath { killer, cause });
        }
        None
    }
}

fn parse_time(raw: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M:%S").ok()
}
