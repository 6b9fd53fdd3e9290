//! Worker-thread translation of the authenticator state machine (§5, §3
//! of the expanded design).
//!
//! The source's single-threaded cooperative event loop becomes a single
//! dedicated thread that exclusively owns the state machine, the pending
//! `with_token` queue, and the subscriber list — "no shared mutable state
//! across threads" by construction rather than by locking. Callers talk
//! to it only through [`AuthenticatorHandle`], which posts `Command`s over
//! an `mpsc::Sender`; the handle never invokes a reply inline.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::authenticator::{AuthData, AuthPhase, Authenticator};
use crate::error::AuthdError;

type Reply = Sender<Result<AuthData, AuthdError>>;
type Subscriber = Box<dyn Fn(AuthData) + Send>;

enum Command {
    WithToken(Reply),
    ExpireToken,
    Subscribe(Subscriber),
    Timeout { generation: u64 },
}

/// Handle to a running authenticator actor thread.
///
/// Cloning shares the same worker: every clone posts `Command`s onto the
/// same channel, mirroring how multiple callers share one cooperative
/// scheduler in the source.
#[derive(Clone)]
pub struct AuthenticatorHandle {
    tx: Sender<Command>,
}

impl AuthenticatorHandle {
    /// Schedule a callback to run with the cached token or a freshly
    /// fetched one (§4.6 `with_token`). The returned receiver yields
    /// exactly one `Result` once the actor has resolved it — the
    /// triggering call is posted last with respect to any callers that
    /// coalesced onto the same in-flight fetch (§4.6 ordering guarantee).
    #[must_use]
    pub fn with_token(&self) -> Receiver<Result<AuthData, AuthdError>> {
        let (reply_tx, reply_rx) = mpsc::channel();
        let _ = self.tx.send(Command::WithToken(reply_tx));
        reply_rx
    }

    /// Invalidate the cached token, triggering a refetch unless one is
    /// already in flight (§4.6 `expire_token`).
    pub fn expire_token(&self) {
        let _ = self.tx.send(Command::ExpireToken);
    }

    /// Register a long-lived subscriber notified, in registration order,
    /// on every transition to a new valid token.
    pub fn subscribe(&self, handler: impl Fn(AuthData) + Send + 'static) {
        let _ = self.tx.send(Command::Subscribe(Box::new(handler)));
    }
}

/// Spawn the actor thread that exclusively owns `authenticator`.
pub fn spawn(authenticator: Authenticator, auth_timeout: Duration) -> AuthenticatorHandle {
    let (tx, rx) = mpsc::channel();
    let loop_tx = tx.clone();
    thread::spawn(move || actor_loop(authenticator, rx, loop_tx, auth_timeout));
    AuthenticatorHandle { tx }
}

/// Arm the per-fetch timeout: a second background thread that sleeps for
/// `timeout`, then sets `flag` directly (so a fetch blocked inside the
/// actor thread can observe cancellation between server attempts even
/// though the actor isn't reading its channel) and posts a `Timeout`
/// command carrying `generation` so the actor can tell a fresh timeout
/// apart from a stale one that arrives after the fetch already settled
/// (§3: "cancellation is idempotent and silent").
fn arm_timeout(tx: Sender<Command>, generation: u64, timeout: Duration, flag: Arc<AtomicBool>) {
    thread::spawn(move || {
        thread::sleep(timeout);
        flag.store(true, Ordering::SeqCst);
        let _ = tx.send(Command::Timeout { generation });
    });
}

fn actor_loop(
    mut auth: Authenticator,
    rx: Receiver<Command>,
    self_tx: Sender<Command>,
    auth_timeout: Duration,
) {
    let mut pending: VecDeque<Reply> = VecDeque::new();
    let mut subscribers: Vec<Subscriber> = Vec::new();
    let mut generation: u64 = 0;

    while let Ok(command) = rx.recv() {
        match command {
            Command::WithToken(reply) => match auth.phase() {
                AuthPhase::Cached(data) => {
                    let _ = reply.send(Ok(data.clone()));
                }
                AuthPhase::Fetching => pending.push_back(reply),
                AuthPhase::Idle | AuthPhase::Expired(_) | AuthPhase::Failed => {
                    pending.push_back(reply);
                    generation += 1;
                    let flag = Arc::new(AtomicBool::new(false));
                    arm_timeout(self_tx.clone(), generation, auth_timeout, flag.clone());
                    run_fetch(&mut auth, &flag, auth_timeout, &mut pending, &subscribers);
                }
            },
            Command::ExpireToken => {
                auth.expire();
                if !matches!(auth.phase(), AuthPhase::Fetching) {
                    generation += 1;
                    let flag = Arc::new(AtomicBool::new(false));
                    arm_timeout(self_tx.clone(), generation, auth_timeout, flag.clone());
                    run_fetch(&mut auth, &flag, auth_timeout, &mut pending, &subscribers);
                }
            }
            Command::Subscribe(handler) => subscribers.push(handler),
            Command::Timeout { generation: fired } => {
                if fired != generation {
                    log::debug!("ignoring stale timeout for generation {fired}");
                }
                // A fresh (fired == generation) timeout's flag was already
                // observed by the fetch that was in flight when it fired,
                // since `run_fetch` runs to completion before control
                // returns here; there is nothing left to do.
            }
        }
    }
}

fn run_fetch(
    auth: &mut Authenticator,
    cancel_flag: &Arc<AtomicBool>,
    auth_timeout: Duration,
    pending: &mut VecDeque<Reply>,
    subscribers: &[Subscriber],
) {
    let result = auth.fetch(cancel_flag, auth_timeout);
    if let Ok(data) = &result {
        for subscriber in subscribers {
            subscriber(data.clone());
        }
    }
    while let Some(reply) = pending.pop_front() {
        let _ = reply.send(result.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::MockCommandRunner;
    use crate::transport::{MockAuthTransport, ServerResponse};
    use agent_common::crypto::{CryptoError, DeviceSigner};
    use std::path::PathBuf;
    use std::sync::Mutex;

    struct FixedSigner;

    impl DeviceSigner for FixedSigner {
        fn sign(&self, payload: &[u8]) -> Result<Vec<u8>, CryptoError> {
            Ok(payload.to_vec())
        }
    }

    fn identity_runner() -> MockCommandRunner {
        let mut mock = MockCommandRunner::new();
        mock.expect_run()
            .returning(|_| Ok("mac=00:11:22:33:44:55".to_owned()));
        mock
    }

    fn spawn_handle(transport: MockAuthTransport) -> AuthenticatorHandle {
        spawn_handle_with_timeout(transport, Duration::from_secs(5))
    }

    fn spawn_handle_with_timeout(
        transport: MockAuthTransport,
        auth_timeout: Duration,
    ) -> AuthenticatorHandle {
        let authenticator = Authenticator::new(
            crate::authenticator::AuthenticatorConfig {
                servers: vec!["https://a.example".to_owned()],
                tenant_token: None,
            },
            PathBuf::from("/bin/true"),
            "PEM".to_owned(),
            Box::new(FixedSigner),
            Box::new(identity_runner()),
            Box::new(transport),
        );
        spawn(authenticator, auth_timeout)
    }

    #[test]
    fn with_token_triggers_exactly_one_fetch_for_many_concurrent_callers() {
        let mut transport = MockAuthTransport::new();
        transport
            .expect_post_auth_request()
            .times(1)
            .returning(|_, _, _, _| Ok(ServerResponse::Token("T".to_owned())));
        let handle = spawn_handle(transport);

        let receivers: Vec<_> = (0..5).map(|_| handle.with_token()).collect();
        for receiver in receivers {
            let data = receiver
                .recv_timeout(Duration::from_secs(5))
                .expect("every caller gets exactly one callback")
                .expect("fetch succeeds");
            assert_eq!(data.token, "T");
        }
    }

    /// S5, end to end through the real timer thread: the first server
    /// takes longer than `auth_timeout` to reply, so by the time its
    /// (failed) reply comes back the armed timeout has already fired;
    /// the second configured server must never be contacted.
    #[test]
    fn a_slow_server_triggers_the_real_timeout_timer_before_the_next_server_is_tried() {
        let mut transport = MockAuthTransport::new();
        transport
            .expect_post_auth_request()
            .times(1)
            .withf(|server, _, _, _| server == "https://a.example")
            .returning(|_, _, _, _| {
                thread::sleep(Duration::from_millis(300));
                Ok(ServerResponse::ApiError(500))
            });
        transport.expect_post_auth_request().times(0).withf(|server, _, _, _| {
            server == "https://b.example"
        });

        let authenticator = Authenticator::new(
            crate::authenticator::AuthenticatorConfig {
                servers: vec!["https://a.example".to_owned(), "https://b.example".to_owned()],
                tenant_token: None,
            },
            PathBuf::from("/bin/true"),
            "PEM".to_owned(),
            Box::new(FixedSigner),
            Box::new(identity_runner()),
            Box::new(transport),
        );
        let handle = spawn(authenticator, Duration::from_millis(100));

        let err = handle
            .with_token()
            .recv_timeout(Duration::from_secs(5))
            .expect("reply arrives")
            .expect_err("the slow server exhausts the timeout before the second is tried");
        assert!(matches!(err, AuthdError::Authentication { reason } if reason.contains("Timed-out")));
    }

    #[test]
    fn subscribers_are_notified_on_a_new_token_in_registration_order() {
        let mut transport = MockAuthTransport::new();
        transport
            .expect_post_auth_request()
            .returning(|_, _, _, _| Ok(ServerResponse::Token("T".to_owned())));
        let handle = spawn_handle(transport);

        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second"] {
            let seen = Arc::clone(&seen);
            handle.subscribe(move |data| seen.lock().expect("lock").push((tag, data.token)));
        }

        // Subscribe and with_token are posted to the same channel in this
        // order, and the actor notifies subscribers before replying to
        // with_token, so by the time the reply arrives both subscribers
        // have already observed the new token.
        handle
            .with_token()
            .recv_timeout(Duration::from_secs(5))
            .expect("reply arrives")
            .expect("fetch succeeds");

        let recorded = seen.lock().expect("lock");
        assert_eq!(recorded.len(), 2);
        assert_eq!(recorded[0].0, "first");
        assert_eq!(recorded[1].0, "second");
    }
}
