//! Grant negotiation
//!
//! [`GrantEngine`] turns an access scope into a usable token. A token already
//! stored for an equal scope is reused. Otherwise a grant is requested; an
//! approved grant is stored right away, while a grant that needs interaction
//! is handed back to the caller as a [`PendingGrant`]. Once the caller has an
//! interaction reference, [`GrantEngine::finalize`] polls the continuation
//! endpoint until a token is issued, the deadline passes, or the server
//! rejects the grant.
//!
//! Splitting request and finalize lets the caller wait on a human without a
//! timer running: the polling budget starts when finalize does.

use paygrant_sdk::{AccessItem, InteractRequest, OpenPaymentsError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::adapter::{ContinueOutcome, GrantAdapter, GrantOutcome};
use crate::error::FlowError;
use crate::poller::{PollError, Poller};
use crate::session::{IssuedToken, Session, Var, VarValue};

/// Overall polling budget for one finalize
pub const DEFAULT_POLL_DEADLINE: Duration = Duration::from_secs(30);

/// Continuation interval when the server does not declare one
pub const DEFAULT_CONTINUE_WAIT: Duration = Duration::from_secs(5);

/// Where the authorization server sends the human after approval
pub const DEFAULT_FINISH_URI: &str = "https://example.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantConfig {
    pub poll_deadline: Duration,
    pub default_wait: Duration,
    pub finish_uri: String,
}

impl Default for GrantConfig {
    fn default() -> Self {
        Self {
            poll_deadline: DEFAULT_POLL_DEADLINE,
            default_wait: DEFAULT_CONTINUE_WAIT,
            finish_uri: DEFAULT_FINISH_URI.to_string(),
        }
    }
}

/// A grant waiting on interaction
///
/// Consumed by [`GrantEngine::finalize`], so one pending grant is polled by
/// at most one loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingGrant {
    /// Variable the token is stored under once issued
    pub target: Var,
    pub scope: AccessItem,
    pub continue_uri: String,
    pub continue_token: String,
    /// Server-declared wait, also used as the polling interval
    pub wait: Duration,
    /// Where the human approves the grant
    pub redirect: Option<String>,
}

/// Result of asking for a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Negotiation {
    /// Usable access token
    Ready(String),
    /// Not usable until a human approves it
    InteractionRequired(PendingGrant),
}

pub struct GrantEngine<A: ?Sized> {
    adapter: Arc<A>,
    config: GrantConfig,
}

impl<A: GrantAdapter + ?Sized> GrantEngine<A> {
    pub fn new(adapter: Arc<A>, config: GrantConfig) -> Self {
        Self { adapter, config }
    }

    pub fn config(&self) -> &GrantConfig {
        &self.config
    }

    /// Reuse the token stored under `target` if it was issued for `scope`,
    /// otherwise request a new grant
    pub async fn ensure_token(
        &self,
        session: &mut Session,
        target: Var,
        auth_server: &str,
        scope: AccessItem,
        interactive: bool,
    ) -> Result<Negotiation, FlowError> {
        if let Some(token) = session.token(target) {
            if token.scope == scope {
                debug!(var = %target, "Reusing stored access token");
                return Ok(Negotiation::Ready(token.value.clone()));
            }
        }

        self.request_grant(session, target, auth_server, scope, interactive)
            .await
    }

    /// Request a new grant, whatever is stored
    pub async fn request_grant(
        &self,
        session: &mut Session,
        target: Var,
        auth_server: &str,
        scope: AccessItem,
        interactive: bool,
    ) -> Result<Negotiation, FlowError> {
        let interact = interactive.then(|| {
            InteractRequest::redirect(
                self.config.finish_uri.clone(),
                uuid::Uuid::new_v4().to_string(),
            )
        });

        info!(
            access_type = %scope.access_type,
            auth_server,
            interactive,
            "Requesting grant"
        );

        let outcome = self
            .adapter
            .request_grant(auth_server, &scope, interact)
            .await
            .map_err(FlowError::from_grant)?;

        match outcome {
            GrantOutcome::Active(value) => {
                session.set(
                    target,
                    VarValue::Token(IssuedToken {
                        value: value.clone(),
                        scope,
                    }),
                )?;
                info!(var = %target, "Grant approved");
                Ok(Negotiation::Ready(value))
            }
            GrantOutcome::Pending(continuation) => {
                let wait = continuation.wait.unwrap_or(self.config.default_wait);
                session.set(Var::ContinueUri, VarValue::Url(continuation.uri.clone()))?;
                session.set(
                    Var::ContinueToken,
                    VarValue::Text(continuation.token.clone()),
                )?;
                session.set(Var::ContinueWait, VarValue::Interval(wait))?;
                session.clear(Var::InteractRef);

                info!(var = %target, ?wait, "Grant requires interaction");
                Ok(Negotiation::InteractionRequired(PendingGrant {
                    target,
                    scope,
                    continue_uri: continuation.uri,
                    continue_token: continuation.token,
                    wait,
                    redirect: continuation.redirect,
                }))
            }
        }
    }

    /// Poll a pending grant until a token is issued
    ///
    /// Waits the server-declared interval once, then continues at that
    /// interval until the configured deadline. "Still pending" and
    /// `too_fast` answers, as well as transient failures, keep polling. A
    /// "still pending" answer that rotates the continuation token, uri or
    /// wait is followed on the next call. The continuation handle is
    /// discarded whatever the result: a timed-out or rejected grant has to
    /// be requested again.
    pub async fn finalize(
        &self,
        session: &mut Session,
        pending: PendingGrant,
        interact_ref: &str,
    ) -> Result<String, FlowError> {
        let PendingGrant {
            target,
            scope,
            continue_uri,
            continue_token,
            wait,
            ..
        } = pending;

        session.set(Var::InteractRef, VarValue::Text(interact_ref.to_string()))?;

        debug!(?wait, "Waiting before continuing grant");
        tokio::time::sleep(wait).await;

        let poller = Poller::new(wait, self.config.poll_deadline);
        let adapter = self.adapter.as_ref();
        let handle = Mutex::new((continue_uri, continue_token));
        let handle = &handle;

        let result = poller
            .poll_paced(
                move || {
                    let (uri, token) = handle
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .clone();
                    async move {
                        match adapter.continue_grant(&uri, &token, Some(interact_ref)).await {
                            Ok(outcome) => Ok(outcome),
                            Err(OpenPaymentsError::TooFast(msg)) => {
                                debug!(%msg, "Continued too early");
                                Ok(ContinueOutcome::StillPending(None))
                            }
                            Err(err) if err.is_retryable() => {
                                warn!(error = %err, "Continuation failed, polling again");
                                Ok(ContinueOutcome::StillPending(None))
                            }
                            Err(err) => Err(err),
                        }
                    }
                },
                ContinueOutcome::is_active,
                move |outcome| {
                    let next = outcome.rotated()?;
                    debug!(uri = %next.uri, wait = ?next.wait, "Continuation rotated");
                    *handle.lock().unwrap_or_else(PoisonError::into_inner) =
                        (next.uri.clone(), next.token.clone());
                    next.wait
                },
            )
            .await;

        self.abandon(session);

        match result {
            Ok(outcome) => {
                let value = outcome.into_token().ok_or_else(|| {
                    FlowError::Api(OpenPaymentsError::InvalidResponse(
                        "continuation finished without an access token".to_string(),
                    ))
                })?;
                session.set(
                    target,
                    VarValue::Token(IssuedToken {
                        value: value.clone(),
                        scope,
                    }),
                )?;
                info!(var = %target, "Grant approved after interaction");
                Ok(value)
            }
            Err(PollError::TimedOut { elapsed }) => {
                warn!(?elapsed, "Grant still pending at deadline");
                Err(FlowError::GrantTimedOut { elapsed })
            }
            Err(PollError::Rejected(err)) => Err(FlowError::from_grant(err)),
        }
    }

    /// Drop the stored continuation handle
    pub fn abandon(&self, session: &mut Session) {
        for var in Var::CONTINUATION {
            session.clear(var);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{MockCall, MockOpenPayments};
    use paygrant_sdk::{AccessAction, AccessType, Amount, Limits};
    use tokio::time::Instant;

    const AUTH: &str = "https://auth.mock";

    fn quote_scope() -> AccessItem {
        AccessItem::new(AccessType::Quote, [AccessAction::Read, AccessAction::Create])
    }

    fn op_scope(debit: &str) -> AccessItem {
        AccessItem::new(
            AccessType::OutgoingPayment,
            [AccessAction::Read, AccessAction::Create, AccessAction::List],
        )
        .identifier("https://wallet.mock/alice")
        .limits(Limits {
            debit_amount: Some(Amount::new(debit, "USD", 2)),
            ..Default::default()
        })
    }

    fn engine(mock: &MockOpenPayments, deadline: Duration) -> GrantEngine<MockOpenPayments> {
        GrantEngine::new(
            Arc::new(mock.clone()),
            GrantConfig {
                poll_deadline: deadline,
                ..Default::default()
            },
        )
    }

    async fn pending(
        engine: &GrantEngine<MockOpenPayments>,
        session: &mut Session,
    ) -> PendingGrant {
        match engine
            .request_grant(session, Var::OutgoingPaymentToken, AUTH, op_scope("500"), true)
            .await
            .unwrap()
        {
            Negotiation::InteractionRequired(pending) => pending,
            other => panic!("expected pending grant, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn ensure_token_reuses_token_for_equal_scope() {
        let mock = MockOpenPayments::new().with_grant_token("q-token");
        let engine = engine(&mock, DEFAULT_POLL_DEADLINE);
        let mut session = Session::new();

        let first = engine
            .ensure_token(&mut session, Var::QuoteToken, AUTH, quote_scope(), false)
            .await
            .unwrap();
        let second = engine
            .ensure_token(&mut session, Var::QuoteToken, AUTH, quote_scope(), false)
            .await
            .unwrap();

        assert_eq!(first, Negotiation::Ready("q-token".into()));
        assert_eq!(second, first);
        assert_eq!(mock.grant_requests(), 1);
    }

    #[tokio::test]
    async fn ensure_token_requests_again_for_different_scope() {
        let mock = MockOpenPayments::new()
            .with_grant_token("op-500")
            .with_grant_token("op-900");
        let engine = engine(&mock, DEFAULT_POLL_DEADLINE);
        let mut session = Session::new();

        engine
            .ensure_token(&mut session, Var::OutgoingPaymentToken, AUTH, op_scope("500"), false)
            .await
            .unwrap();
        let second = engine
            .ensure_token(&mut session, Var::OutgoingPaymentToken, AUTH, op_scope("900"), false)
            .await
            .unwrap();

        assert_eq!(second, Negotiation::Ready("op-900".into()));
        assert_eq!(mock.grant_requests(), 2);
        assert_eq!(
            session.token(Var::OutgoingPaymentToken).unwrap().scope,
            op_scope("900")
        );
    }

    #[tokio::test]
    async fn request_grant_always_asks_the_server() {
        let mock = MockOpenPayments::new()
            .with_grant_token("old")
            .with_grant_token("new");
        let engine = engine(&mock, DEFAULT_POLL_DEADLINE);
        let mut session = Session::new();

        for _ in 0..2 {
            engine
                .request_grant(&mut session, Var::QuoteToken, AUTH, quote_scope(), false)
                .await
                .unwrap();
        }

        assert_eq!(session.token(Var::QuoteToken).unwrap().value, "new");
        assert_eq!(mock.grant_requests(), 2);
    }

    #[tokio::test]
    async fn interactive_request_stores_continuation() {
        let mock = MockOpenPayments::new().with_pending_grant(2);
        let engine = engine(&mock, DEFAULT_POLL_DEADLINE);
        let mut session = Session::new();

        let pending = pending(&engine, &mut session).await;

        assert_eq!(pending.wait, Duration::from_secs(2));
        assert_eq!(pending.redirect.as_deref(), Some("https://auth.mock/interact/1"));
        assert_eq!(session.text(Var::ContinueUri), Some("https://auth.mock/continue/1"));
        assert_eq!(session.text(Var::ContinueToken), Some("continue-token"));
        assert_eq!(session.interval(Var::ContinueWait), Some(Duration::from_secs(2)));
        assert!(session.token(Var::OutgoingPaymentToken).is_none());
        assert!(matches!(
            &mock.calls()[0],
            MockCall::RequestGrant { interactive: true, .. }
        ));
    }

    #[tokio::test]
    async fn missing_wait_defaults_to_five_seconds() {
        let mock = MockOpenPayments::new().with_grant(GrantOutcome::Pending(
            crate::adapter::GrantContinuation {
                uri: "https://auth.mock/continue/9".into(),
                token: "c".into(),
                wait: None,
                redirect: None,
            },
        ));
        let engine = engine(&mock, DEFAULT_POLL_DEADLINE);
        let mut session = Session::new();

        let pending = pending(&engine, &mut session).await;
        assert_eq!(pending.wait, DEFAULT_CONTINUE_WAIT);
    }

    #[tokio::test(start_paused = true)]
    async fn finalize_after_one_pending_poll() {
        let mock = MockOpenPayments::new()
            .with_pending_grant(1)
            .with_still_pending(1)
            .with_continuation_token("T1");
        let engine = engine(&mock, DEFAULT_POLL_DEADLINE);
        let mut session = Session::new();
        let pending = pending(&engine, &mut session).await;

        let start = Instant::now();
        let token = engine.finalize(&mut session, pending, "ref-1").await.unwrap();

        assert_eq!(token, "T1");
        // One server wait before the first call, one interval after "still pending"
        assert_eq!(start.elapsed(), Duration::from_secs(2));
        assert_eq!(mock.continuation_calls(), 2);
        assert_eq!(session.token(Var::OutgoingPaymentToken).unwrap().value, "T1");
        assert_eq!(
            session.token(Var::OutgoingPaymentToken).unwrap().scope,
            op_scope("500")
        );
        for var in Var::CONTINUATION {
            assert!(!session.contains(var), "{} left behind", var);
        }
        assert!(matches!(
            &mock.calls()[1],
            MockCall::ContinueGrant { interact_ref: Some(r), token, .. }
                if r == "ref-1" && token == "continue-token"
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn finalize_succeeds_iff_pending_time_under_deadline() {
        let deadline = Duration::from_secs(3);

        for k in 0..6usize {
            let mock = MockOpenPayments::new()
                .with_pending_grant(1)
                .with_still_pending(k)
                .with_continuation_token("T");
            let engine = engine(&mock, deadline);
            let mut session = Session::new();
            let pending = pending(&engine, &mut session).await;

            let result = engine.finalize(&mut session, pending, "r").await;

            if Duration::from_secs(k as u64) < deadline {
                assert_eq!(result.unwrap(), "T", "k = {}", k);
            } else {
                assert!(
                    matches!(result, Err(FlowError::GrantTimedOut { .. })),
                    "k = {}",
                    k
                );
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn rotated_continuation_is_used_for_next_call() {
        let mock = MockOpenPayments::new()
            .with_pending_grant(1)
            .with_rotated_continuation("continue-token-2", 3)
            .with_continuation_token("T2");
        let engine = engine(&mock, DEFAULT_POLL_DEADLINE);
        let mut session = Session::new();
        let pending = pending(&engine, &mut session).await;

        let start = Instant::now();
        let token = engine.finalize(&mut session, pending, "ref-2").await.unwrap();

        assert_eq!(token, "T2");
        // First server wait, then the rotated wait
        assert_eq!(start.elapsed(), Duration::from_secs(4));
        let continues: Vec<_> = mock
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                MockCall::ContinueGrant { uri, token, .. } => Some((uri, token)),
                _ => None,
            })
            .collect();
        assert_eq!(
            continues,
            vec![
                (
                    "https://auth.mock/continue/1".to_string(),
                    "continue-token".to_string()
                ),
                (
                    "https://auth.mock/continue/continue-token-2".to_string(),
                    "continue-token-2".to_string()
                ),
            ]
        );
        for var in Var::CONTINUATION {
            assert!(!session.contains(var), "{} left behind", var);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_grant_discards_continuation() {
        let mock = MockOpenPayments::new()
            .with_pending_grant(5)
            .with_still_pending(100);
        let engine = engine(&mock, Duration::from_secs(30));
        let mut session = Session::new();
        let pending = pending(&engine, &mut session).await;

        let err = engine
            .finalize(&mut session, pending, "r")
            .await
            .unwrap_err();

        match err {
            FlowError::GrantTimedOut { elapsed } => assert_eq!(elapsed, Duration::from_secs(30)),
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(mock.continuation_calls(), 6);
        assert!(session.token(Var::OutgoingPaymentToken).is_none());
        assert!(!session.contains(Var::ContinueUri));
        assert!(!session.contains(Var::ContinueToken));
    }

    #[tokio::test(start_paused = true)]
    async fn too_fast_and_transient_failures_keep_polling() {
        let mock = MockOpenPayments::new()
            .with_pending_grant(1)
            .with_continuation_error(OpenPaymentsError::TooFast("slow down".into()))
            .with_continuation_error(OpenPaymentsError::Network("reset".into()))
            .with_continuation_error(OpenPaymentsError::ServiceUnavailable("503".into()))
            .with_continuation_token("T");
        let engine = engine(&mock, DEFAULT_POLL_DEADLINE);
        let mut session = Session::new();
        let pending = pending(&engine, &mut session).await;

        let token = engine.finalize(&mut session, pending, "r").await.unwrap();

        assert_eq!(token, "T");
        assert_eq!(mock.continuation_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn denied_grant_stops_polling() {
        let mock = MockOpenPayments::new()
            .with_pending_grant(1)
            .with_still_pending(1)
            .with_continuation_error(OpenPaymentsError::Denied("user_denied".into()));
        let engine = engine(&mock, DEFAULT_POLL_DEADLINE);
        let mut session = Session::new();
        let pending = pending(&engine, &mut session).await;

        let err = engine
            .finalize(&mut session, pending, "r")
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::GrantDenied(_)));
        assert_eq!(mock.continuation_calls(), 2);
        assert!(!session.contains(Var::ContinueUri));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_continuation_is_bounded_by_deadline() {
        let mock = MockOpenPayments::new()
            .with_pending_grant(1)
            .with_continue_delay(Duration::from_secs(120));
        let engine = engine(&mock, Duration::from_secs(10));
        let mut session = Session::new();
        let pending = pending(&engine, &mut session).await;

        let start = Instant::now();
        let err = engine
            .finalize(&mut session, pending, "r")
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::GrantTimedOut { .. }));
        assert_eq!(start.elapsed(), Duration::from_secs(11));
    }

    #[tokio::test]
    async fn rejected_request_is_grant_denied() {
        let mock = MockOpenPayments::new()
            .with_grant_error(OpenPaymentsError::Unauthorized("invalid_client".into()));
        let engine = engine(&mock, DEFAULT_POLL_DEADLINE);
        let mut session = Session::new();

        let err = engine
            .request_grant(&mut session, Var::QuoteToken, AUTH, quote_scope(), false)
            .await
            .unwrap_err();

        assert!(matches!(err, FlowError::GrantDenied(_)));
        assert!(session.is_empty());
    }
}
