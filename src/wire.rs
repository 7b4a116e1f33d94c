use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tracing::{debug, warn};

use crate::auth::PasswordAuth;
use crate::engine::{Engine, EngineError, is_slots_available};
use crate::limits::{MAX_LINE_LEN, MAX_LISTENS_PER_CONNECTION};
use crate::model::*;
use crate::observability;
use crate::protocol::{self, Command, ProtocolError};

const EVENT_QUEUE: usize = 256;

/// One protocol reply line, and whether the connection ends after it.
enum Reply {
    Line(String),
    Close(String),
}

fn ok() -> String {
    "OK".to_string()
}

fn ok_value(value: impl std::fmt::Display) -> String {
    format!("OK {value}")
}

fn ok_json<T: Serialize>(value: &T) -> String {
    match serde_json::to_string(value) {
        Ok(json) => format!("OK {json}"),
        Err(e) => err_line("internal", &e.to_string()),
    }
}

fn err_line(code: &str, message: &str) -> String {
    format!("ERR {code} {message}")
}

fn engine_err(e: EngineError) -> String {
    err_line(e.code(), &e.to_string())
}

fn protocol_err(e: ProtocolError) -> String {
    err_line(e.code(), &e.to_string())
}

/// Per-connection state: caller identity and active LISTEN forwarders.
struct Session {
    engine: Arc<Engine>,
    auth: PasswordAuth,
    caller: Option<Owner>,
    listeners: HashMap<ProfileId, JoinHandle<()>>,
    events: mpsc::Sender<Event>,
}

impl Session {
    fn handle_line(&mut self, line: &str) -> Reply {
        let cmd = match protocol::parse_line(line) {
            Ok(cmd) => cmd,
            Err(e) => {
                metrics::counter!(observability::COMMANDS_TOTAL, "command" => "invalid", "status" => "error")
                    .increment(1);
                return Reply::Line(protocol_err(e));
            }
        };

        let label = observability::command_label(&cmd);
        let started = Instant::now();
        let reply = self.execute(cmd);
        metrics::histogram!(observability::COMMAND_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());

        let text = match &reply {
            Reply::Line(s) | Reply::Close(s) => s,
        };
        let status = if text.starts_with("ERR") { "error" } else { "ok" };
        metrics::counter!(observability::COMMANDS_TOTAL, "command" => label, "status" => status)
            .increment(1);
        debug!("{label}: {status}");
        reply
    }

    fn authenticate(&mut self, owner: Owner, password: &str) -> Reply {
        if self.caller.is_some() {
            return Reply::Line(err_line("already_authenticated", "connection is already authenticated"));
        }
        match self.auth.authenticate(owner, password) {
            Some(owner) => {
                debug!("authenticated as {owner}");
                let reply = ok_value(&owner);
                self.caller = Some(owner);
                Reply::Line(reply)
            }
            None => {
                metrics::counter!(observability::AUTH_FAILURES_TOTAL).increment(1);
                Reply::Close(err_line("auth_failed", "password authentication failed"))
            }
        }
    }

    fn execute(&mut self, cmd: Command) -> Reply {
        match cmd {
            Command::Quit => return Reply::Close(ok()),
            Command::Auth { owner, password } => return self.authenticate(owner, &password),
            _ => {}
        }
        let Some(caller) = self.caller.clone() else {
            return Reply::Line(err_line("auth_required", "send AUTH <owner> <password> first"));
        };
        let engine = self.engine.clone();

        let line = match cmd {
            Command::Check { mask, start, count } => match is_slots_available(&mask, start, count) {
                Ok(free) => ok_value(free),
                Err(e) => engine_err(e),
            },
            Command::Lock {
                profile_id,
                bucket,
                start,
                count,
            } => match engine.lock_calendar_slots(&caller, profile_id, &bucket, start, count) {
                Ok(()) => ok(),
                Err(e) => engine_err(e),
            },
            Command::Mask { profile_id, bucket } => match engine.calendar_mask(profile_id, &bucket) {
                Ok(mask) => ok_value(mask),
                Err(e) => engine_err(e),
            },
            Command::CreateProfile { handle, image_uri } => {
                match engine.create_profile(&caller, &handle, &image_uri) {
                    Ok(profile) => ok_json(&profile),
                    Err(e) => engine_err(e),
                }
            }
            Command::ProfileById { id } => match engine.profiles.get_profile_by_id(id) {
                Ok(profile) => ok_json(&profile),
                Err(e) => engine_err(e.into()),
            },
            Command::ProfileByHandle { handle } => match engine.profiles.get_profile_by_handle(&handle) {
                Ok(profile) => ok_json(&profile),
                Err(e) => engine_err(e.into()),
            },
            Command::ProfilesOf { owner } => ok_json(&engine.profiles.get_user_profiles(&owner)),
            Command::OwnerOf { id } => match engine.profiles.owner_of(id) {
                Ok(owner) => ok_value(owner),
                Err(e) => engine_err(e.into()),
            },
            Command::CreateAvailability {
                profile_id,
                name,
                days,
            } => match engine.create_availability(&caller, profile_id, &name, days) {
                Ok(availability) => ok_json(&availability),
                Err(e) => engine_err(e),
            },
            Command::CreateSessionType { profile_id, spec } => {
                match engine.create_session_type(&caller, profile_id, spec) {
                    Ok(session_type) => ok_json(&session_type),
                    Err(e) => engine_err(e),
                }
            }
            Command::GetSessionType { id } => match engine.get_session_type(id) {
                Ok(session_type) => ok_json(&session_type),
                Err(e) => engine_err(e),
            },
            Command::Whitelist { token, enabled } => {
                match engine.whitelist_currency(&caller, token, enabled) {
                    Ok(()) => ok(),
                    Err(e) => engine_err(e),
                }
            }
            Command::Book {
                session_type_id,
                start_time,
                paid,
            } => match engine.book(&caller, session_type_id, start_time, paid) {
                Ok(booking) => ok_json(&booking),
                Err(e) => engine_err(e),
            },
            Command::Free {
                session_type_id,
                date,
            } => match engine.free_slots(session_type_id, date) {
                Ok(ranges) => ok_json(&ranges),
                Err(e) => engine_err(e),
            },
            Command::Bookings { profile_id } => ok_json(&engine.bookings_for_profile(profile_id)),
            Command::Listen { profile_id } => self.listen(profile_id),
            Command::Unlisten { profile_id } => self.unlisten(profile_id),
            Command::Auth { .. } | Command::Quit => ok(),
        };
        Reply::Line(line)
    }

    fn listen(&mut self, profile_id: ProfileId) -> String {
        if let Err(e) = self.engine.profiles.get_profile_by_id(profile_id) {
            return engine_err(e.into());
        }
        if self.listeners.contains_key(&profile_id) {
            return ok();
        }
        if self.listeners.len() >= MAX_LISTENS_PER_CONNECTION {
            return engine_err(EngineError::LimitExceeded("too many listens on this connection"));
        }

        let mut rx = self.engine.notify.subscribe(profile_id);
        let tx = self.events.clone();
        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("listener on profile {profile_id} lagged, {n} events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        self.listeners.insert(profile_id, handle);
        ok()
    }

    fn unlisten(&mut self, profile_id: ProfileId) -> String {
        if let Some(handle) = self.listeners.remove(&profile_id) {
            handle.abort();
            self.engine.notify.prune();
        }
        ok()
    }

    fn close(&mut self) {
        for (_, handle) in self.listeners.drain() {
            handle.abort();
        }
        self.engine.notify.prune();
    }
}

/// Serve one client connection until QUIT, EOF, or an I/O error.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
    password: String,
) -> Result<(), LinesCodecError> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    let (events, mut event_rx) = mpsc::channel::<Event>(EVENT_QUEUE);
    let mut session = Session {
        engine,
        auth: PasswordAuth::new(password),
        caller: None,
        listeners: HashMap::new(),
        events,
    };

    let result = serve(&mut framed, &mut session, &mut event_rx).await;
    session.close();
    result
}

async fn serve(
    framed: &mut Framed<TcpStream, LinesCodec>,
    session: &mut Session,
    event_rx: &mut mpsc::Receiver<Event>,
) -> Result<(), LinesCodecError> {
    loop {
        tokio::select! {
            line = framed.next() => {
                let line = match line {
                    None => return Ok(()),
                    Some(Ok(line)) => line,
                    Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                        framed
                            .send(err_line("line_too_long", &format!("lines are limited to {MAX_LINE_LEN} bytes")))
                            .await?;
                        continue;
                    }
                    Some(Err(e)) => return Err(e),
                };
                if line.trim().is_empty() {
                    continue;
                }
                match session.handle_line(&line) {
                    Reply::Line(reply) => framed.send(reply).await?,
                    Reply::Close(reply) => {
                        framed.send(reply).await?;
                        return Ok(());
                    }
                }
            }
            Some(event) = event_rx.recv() => {
                match serde_json::to_string(&event) {
                    Ok(json) => framed.send(format!("EVENT {} {json}", event.profile_id())).await?,
                    Err(e) => warn!("failed to encode event: {e}"),
                }
            }
        }
    }
}
