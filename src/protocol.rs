use chrono::NaiveDate;

use crate::model::*;

/// Parsed command from one protocol line.
#[derive(Debug, PartialEq)]
pub enum Command {
    Auth {
        owner: Owner,
        password: String,
    },
    Check {
        mask: SlotMask,
        start: u32,
        count: u32,
    },
    Lock {
        profile_id: ProfileId,
        bucket: BucketKey,
        start: u32,
        count: u32,
    },
    Mask {
        profile_id: ProfileId,
        bucket: BucketKey,
    },
    CreateProfile {
        handle: String,
        image_uri: String,
    },
    ProfileById {
        id: ProfileId,
    },
    ProfileByHandle {
        handle: String,
    },
    ProfilesOf {
        owner: Owner,
    },
    OwnerOf {
        id: ProfileId,
    },
    CreateAvailability {
        profile_id: ProfileId,
        name: String,
        days: [SlotMask; 7],
    },
    CreateSessionType {
        profile_id: ProfileId,
        spec: SessionTypeSpec,
    },
    GetSessionType {
        id: u64,
    },
    Whitelist {
        token: Owner,
        enabled: bool,
    },
    Book {
        session_type_id: u64,
        start_time: Secs,
        paid: u128,
    },
    Free {
        session_type_id: u64,
        date: NaiveDate,
    },
    Bookings {
        profile_id: ProfileId,
    },
    Listen {
        profile_id: ProfileId,
    },
    Unlisten {
        profile_id: ProfileId,
    },
    Quit,
}

#[derive(Debug, PartialEq)]
pub enum ProtocolError {
    Empty,
    UnknownCommand(String),
    WrongArity(&'static str, usize, usize),
    BadArgument(&'static str, String),
    BadJson(String),
}

impl ProtocolError {
    pub fn code(&self) -> &'static str {
        match self {
            ProtocolError::Empty => "empty_command",
            ProtocolError::UnknownCommand(_) => "unknown_command",
            ProtocolError::WrongArity(..) => "wrong_arity",
            ProtocolError::BadArgument(..) => "bad_argument",
            ProtocolError::BadJson(_) => "bad_json",
        }
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolError::Empty => write!(f, "empty command"),
            ProtocolError::UnknownCommand(c) => write!(f, "unknown command: {c}"),
            ProtocolError::WrongArity(c, expected, got) => {
                write!(f, "{c}: expected {expected} arguments, got {got}")
            }
            ProtocolError::BadArgument(name, value) => write!(f, "bad {name}: {value}"),
            ProtocolError::BadJson(e) => write!(f, "bad json: {e}"),
        }
    }
}

impl std::error::Error for ProtocolError {}

pub fn parse_line(line: &str) -> Result<Command, ProtocolError> {
    let line = line.trim();
    let (verb, rest) = split_word(line);
    if verb.is_empty() {
        return Err(ProtocolError::Empty);
    }

    match verb.to_ascii_uppercase().as_str() {
        "AUTH" => {
            let [owner, password] = args::<2>("AUTH", rest)?;
            Ok(Command::Auth {
                owner: Owner::new(owner),
                password: password.to_string(),
            })
        }
        "CHECK" => {
            let [mask, start, count] = args::<3>("CHECK", rest)?;
            Ok(Command::Check {
                mask: parse_mask(mask)?,
                start: parse_num("start", start)?,
                count: parse_num("count", count)?,
            })
        }
        "LOCK" => {
            let [profile_id, bucket, start, count] = args::<4>("LOCK", rest)?;
            Ok(Command::Lock {
                profile_id: parse_num("profile_id", profile_id)?,
                bucket: BucketKey::from(bucket),
                start: parse_num("start", start)?,
                count: parse_num("count", count)?,
            })
        }
        "MASK" => {
            let [profile_id, bucket] = args::<2>("MASK", rest)?;
            Ok(Command::Mask {
                profile_id: parse_num("profile_id", profile_id)?,
                bucket: BucketKey::from(bucket),
            })
        }
        "PROFILE" => parse_profile(rest),
        "OWNEROF" => {
            let [id] = args::<1>("OWNEROF", rest)?;
            Ok(Command::OwnerOf {
                id: parse_num("profile_id", id)?,
            })
        }
        "AVAILABILITY" => {
            let (sub, rest) = split_word(rest);
            if !sub.eq_ignore_ascii_case("CREATE") {
                return Err(ProtocolError::UnknownCommand(format!("AVAILABILITY {sub}")));
            }
            let [profile_id, name, m0, m1, m2, m3, m4, m5, m6] =
                args::<9>("AVAILABILITY CREATE", rest)?;
            let mut days = [SlotMask::EMPTY; 7];
            for (day, text) in days.iter_mut().zip([m0, m1, m2, m3, m4, m5, m6]) {
                *day = parse_mask(text)?;
            }
            Ok(Command::CreateAvailability {
                profile_id: parse_num("profile_id", profile_id)?,
                name: name.to_string(),
                days,
            })
        }
        "SESSIONTYPE" => parse_session_type(rest),
        "WHITELIST" => {
            let [token, enabled] = args::<2>("WHITELIST", rest)?;
            Ok(Command::Whitelist {
                token: Owner::new(token),
                enabled: parse_bool(enabled)?,
            })
        }
        "BOOK" => {
            let [session_type_id, start_time, paid] = args::<3>("BOOK", rest)?;
            Ok(Command::Book {
                session_type_id: parse_num("session_type_id", session_type_id)?,
                start_time: parse_num("start_time", start_time)?,
                paid: parse_num("paid", paid)?,
            })
        }
        "FREE" => {
            let [session_type_id, date] = args::<2>("FREE", rest)?;
            Ok(Command::Free {
                session_type_id: parse_num("session_type_id", session_type_id)?,
                date: NaiveDate::parse_from_str(date, "%Y-%m-%d")
                    .map_err(|_| ProtocolError::BadArgument("date", date.to_string()))?,
            })
        }
        "BOOKINGS" => {
            let [profile_id] = args::<1>("BOOKINGS", rest)?;
            Ok(Command::Bookings {
                profile_id: parse_num("profile_id", profile_id)?,
            })
        }
        "LISTEN" => {
            let [profile_id] = args::<1>("LISTEN", rest)?;
            Ok(Command::Listen {
                profile_id: parse_num("profile_id", profile_id)?,
            })
        }
        "UNLISTEN" => {
            let [profile_id] = args::<1>("UNLISTEN", rest)?;
            Ok(Command::Unlisten {
                profile_id: parse_num("profile_id", profile_id)?,
            })
        }
        "QUIT" => {
            args::<0>("QUIT", rest)?;
            Ok(Command::Quit)
        }
        _ => Err(ProtocolError::UnknownCommand(verb.to_string())),
    }
}

fn parse_profile(rest: &str) -> Result<Command, ProtocolError> {
    let (sub, rest) = split_word(rest);
    match sub.to_ascii_uppercase().as_str() {
        "CREATE" => {
            let parts: Vec<&str> = rest.split_whitespace().collect();
            match parts.as_slice() {
                [handle] => Ok(Command::CreateProfile {
                    handle: handle.to_string(),
                    image_uri: String::new(),
                }),
                [handle, image_uri] => Ok(Command::CreateProfile {
                    handle: handle.to_string(),
                    image_uri: image_uri.to_string(),
                }),
                _ => Err(ProtocolError::WrongArity("PROFILE CREATE", 2, parts.len())),
            }
        }
        "ID" => {
            let [id] = args::<1>("PROFILE ID", rest)?;
            Ok(Command::ProfileById {
                id: parse_num("profile_id", id)?,
            })
        }
        "HANDLE" => {
            let [handle] = args::<1>("PROFILE HANDLE", rest)?;
            Ok(Command::ProfileByHandle {
                handle: handle.to_string(),
            })
        }
        "OWNER" => {
            let [owner] = args::<1>("PROFILE OWNER", rest)?;
            Ok(Command::ProfilesOf {
                owner: Owner::new(owner),
            })
        }
        _ => Err(ProtocolError::UnknownCommand(format!("PROFILE {sub}"))),
    }
}

fn parse_session_type(rest: &str) -> Result<Command, ProtocolError> {
    let (sub, rest) = split_word(rest);
    match sub.to_ascii_uppercase().as_str() {
        "CREATE" => {
            // The JSON body may contain spaces; it runs to the end of the line.
            let (profile_id, json) = split_word(rest);
            if profile_id.is_empty() || json.is_empty() {
                let got = usize::from(!profile_id.is_empty());
                return Err(ProtocolError::WrongArity("SESSIONTYPE CREATE", 2, got));
            }
            let spec: SessionTypeSpec =
                serde_json::from_str(json).map_err(|e| ProtocolError::BadJson(e.to_string()))?;
            Ok(Command::CreateSessionType {
                profile_id: parse_num("profile_id", profile_id)?,
                spec,
            })
        }
        "GET" => {
            let [id] = args::<1>("SESSIONTYPE GET", rest)?;
            Ok(Command::GetSessionType {
                id: parse_num("session_type_id", id)?,
            })
        }
        _ => Err(ProtocolError::UnknownCommand(format!("SESSIONTYPE {sub}"))),
    }
}

/// Split off the first whitespace-delimited word.
fn split_word(s: &str) -> (&str, &str) {
    let s = s.trim_start();
    match s.find(char::is_whitespace) {
        Some(i) => (&s[..i], s[i..].trim_start()),
        None => (s, ""),
    }
}

fn args<'a, const N: usize>(command: &'static str, rest: &'a str) -> Result<[&'a str; N], ProtocolError> {
    let parts: Vec<&str> = rest.split_whitespace().collect();
    let got = parts.len();
    parts
        .try_into()
        .map_err(|_| ProtocolError::WrongArity(command, N, got))
}

fn parse_num<T: std::str::FromStr>(name: &'static str, s: &str) -> Result<T, ProtocolError> {
    s.parse()
        .map_err(|_| ProtocolError::BadArgument(name, s.to_string()))
}

fn parse_mask(s: &str) -> Result<SlotMask, ProtocolError> {
    s.parse()
        .map_err(|e: ParseMaskError| ProtocolError::BadArgument("mask", e.to_string()))
}

fn parse_bool(s: &str) -> Result<bool, ProtocolError> {
    match s.to_ascii_lowercase().as_str() {
        "true" | "1" | "on" => Ok(true),
        "false" | "0" | "off" => Ok(false),
        _ => Err(ProtocolError::BadArgument("flag", s.to_string())),
    }
}
