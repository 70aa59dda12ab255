use async_trait::async_trait;
use gatekeeper_core::GatewayError;
use gatekeeper_core::access::AccessDecisionRequest;
use gatekeeper_filter::{Filter, FilterAction, FilterResponse, ProxyContext};
use glob::Pattern;
use tracing::{debug, warn};

/// Authorization validator.
///
/// Whitelisted paths pass without consulting the policy service. For
/// everything else the decision comes from the access-decision call with
/// the caller's role (empty for anonymous). A rejected caller that
/// presented credentials gets 401 (invalid or expired), one that did not
/// gets 403. A failed policy call also yields 403; the response is
/// returned, never dispatched as an error, so the request is answered
/// exactly once.
pub struct AuthorizationFilter {
    whitelist: Vec<Pattern>,
}

impl AuthorizationFilter {
    pub fn new(patterns: &[String]) -> Result<Self, GatewayError> {
        let whitelist = patterns
            .iter()
            .map(|p| {
                Pattern::new(p)
                    .map_err(|e| GatewayError::Config(format!("bad whitelist pattern {p:?}: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { whitelist })
    }

    fn whitelisted(&self, path: &str) -> bool {
        self.whitelist.iter().any(|p| p.matches(path))
    }
}

#[async_trait(?Send)]
impl Filter for AuthorizationFilter {
    fn name(&self) -> &str {
        "authorization"
    }

    async fn apply(&self, ctx: &mut ProxyContext) -> Result<FilterAction, GatewayError> {
        let path = ctx.request.path.clone();

        if self.whitelisted(&path) {
            debug!(path = %path, "Path whitelisted, skipping access check");
            return Ok(FilterAction::Continue);
        }

        let role_no = ctx
            .user()
            .map(|u| u.role_no.clone())
            .unwrap_or_default();

        let req = AccessDecisionRequest {
            role_no,
            url: path.clone(),
            method: ctx.request.method.clone(),
        };

        let decision = match ctx.access.test_resource_access(&ctx.trace, req).await {
            Ok(d) => d,
            Err(e) => {
                warn!(path = %path, error = %e, "Access decision call failed");
                return Ok(FilterAction::Respond(FilterResponse::json(
                    403,
                    "Not authorized",
                )));
            }
        };

        if !decision.valid {
            // Credentials were presented but the role is rejected: the
            // token is treated as invalid or expired.
            if ctx.request.has_header("Authorization") {
                return Ok(FilterAction::Respond(FilterResponse::json(
                    401,
                    "Invalid or expired credentials",
                )));
            }
            return Ok(FilterAction::Respond(FilterResponse::json(
                403,
                "Not authorized",
            )));
        }

        Ok(FilterAction::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_core::TraceContext;
    use gatekeeper_core::User;
    use gatekeeper_core::access::AccessDecisionResponse;
    use gatekeeper_filter::{AccessDecider, InboundRequest};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn block_on<F: std::future::Future>(fut: F) -> F::Output {
        let mut rt = monoio::RuntimeBuilder::<monoio::LegacyDriver>::new()
            .build()
            .expect("build runtime");
        rt.block_on(fut)
    }

    /// Scripted policy oracle that records what it was asked.
    struct StubDecider {
        result: Result<bool, ()>,
        calls: Cell<usize>,
        last_request: RefCell<Option<AccessDecisionRequest>>,
    }

    impl StubDecider {
        fn valid(valid: bool) -> Rc<Self> {
            Rc::new(Self {
                result: Ok(valid),
                calls: Cell::new(0),
                last_request: RefCell::new(None),
            })
        }

        fn failing() -> Rc<Self> {
            Rc::new(Self {
                result: Err(()),
                calls: Cell::new(0),
                last_request: RefCell::new(None),
            })
        }
    }

    #[async_trait(?Send)]
    impl AccessDecider for StubDecider {
        async fn test_resource_access(
            &self,
            _trace: &TraceContext,
            req: AccessDecisionRequest,
        ) -> Result<AccessDecisionResponse, GatewayError> {
            self.calls.set(self.calls.get() + 1);
            *self.last_request.borrow_mut() = Some(req);
            match self.result {
                Ok(valid) => Ok(AccessDecisionResponse { valid }),
                Err(()) => Err(GatewayError::AccessDecision("policy service down".into())),
            }
        }
    }

    fn make_ctx(
        decider: Rc<StubDecider>,
        path: &str,
        auth_header: Option<&str>,
        user: Option<User>,
    ) -> ProxyContext {
        let mut headers = Vec::new();
        if let Some(v) = auth_header {
            headers.push(("Authorization".to_string(), v.to_string()));
        }
        let mut ctx = ProxyContext::new(
            TraceContext::root(),
            InboundRequest {
                method: "GET".into(),
                path: path.to_string(),
                raw_query: String::new(),
                headers,
            },
            decider,
        );
        if let Some(u) = user {
            ctx.set_user(u);
        }
        ctx
    }

    fn admin() -> User {
        User {
            id: "1".into(),
            username: "alice".into(),
            user_no: "UE1".into(),
            role_no: "admin".into(),
        }
    }

    #[test]
    fn whitelisted_path_skips_the_oracle() {
        block_on(async {
            let filter = AuthorizationFilter::new(&["/public/*".to_string()]).unwrap();
            let decider = StubDecider::valid(false);
            let mut ctx = make_ctx(Rc::clone(&decider), "/public/ping", None, None);

            let action = filter.apply(&mut ctx).await.unwrap();
            assert!(matches!(action, FilterAction::Continue));
            assert_eq!(decider.calls.get(), 0, "oracle must not be consulted");
        });
    }

    #[test]
    fn valid_decision_continues() {
        block_on(async {
            let filter = AuthorizationFilter::new(&[]).unwrap();
            let decider = StubDecider::valid(true);
            let mut ctx = make_ctx(
                Rc::clone(&decider),
                "/user-svc/api/profile",
                Some("Bearer t"),
                Some(admin()),
            );

            let action = filter.apply(&mut ctx).await.unwrap();
            assert!(matches!(action, FilterAction::Continue));
            assert_eq!(decider.calls.get(), 1);

            let req = decider.last_request.borrow().clone().unwrap();
            assert_eq!(req.role_no, "admin");
            assert_eq!(req.url, "/user-svc/api/profile");
            assert_eq!(req.method, "GET");
        });
    }

    #[test]
    fn anonymous_caller_sends_empty_role() {
        block_on(async {
            let filter = AuthorizationFilter::new(&[]).unwrap();
            let decider = StubDecider::valid(true);
            let mut ctx = make_ctx(Rc::clone(&decider), "/user-svc/api/profile", None, None);

            filter.apply(&mut ctx).await.unwrap();
            let req = decider.last_request.borrow().clone().unwrap();
            assert_eq!(req.role_no, "");
        });
    }

    #[test]
    fn rejection_with_credentials_is_401() {
        block_on(async {
            let filter = AuthorizationFilter::new(&[]).unwrap();
            let decider = StubDecider::valid(false);
            let mut ctx = make_ctx(
                Rc::clone(&decider),
                "/user-svc/api/profile",
                Some("Bearer t"),
                Some(admin()),
            );

            match filter.apply(&mut ctx).await.unwrap() {
                FilterAction::Respond(resp) => assert_eq!(resp.status, 401),
                other => panic!("expected Respond, got {other:?}"),
            }
        });
    }

    #[test]
    fn rejection_without_credentials_is_403() {
        block_on(async {
            let filter = AuthorizationFilter::new(&[]).unwrap();
            let decider = StubDecider::valid(false);
            let mut ctx = make_ctx(Rc::clone(&decider), "/user-svc/api/profile", None, None);

            match filter.apply(&mut ctx).await.unwrap() {
                FilterAction::Respond(resp) => assert_eq!(resp.status, 403),
                other => panic!("expected Respond, got {other:?}"),
            }
        });
    }

    #[test]
    fn oracle_failure_is_403_not_an_error() {
        block_on(async {
            let filter = AuthorizationFilter::new(&[]).unwrap();
            let decider = StubDecider::failing();
            let mut ctx = make_ctx(
                Rc::clone(&decider),
                "/user-svc/api/profile",
                Some("Bearer t"),
                None,
            );

            // The response is returned, not an Err: the request must be
            // answered exactly once.
            match filter.apply(&mut ctx).await.unwrap() {
                FilterAction::Respond(resp) => assert_eq!(resp.status, 403),
                other => panic!("expected Respond, got {other:?}"),
            }
        });
    }

    #[test]
    fn whitelist_matches_full_path_only() {
        block_on(async {
            let filter = AuthorizationFilter::new(&["/public/*".to_string()]).unwrap();
            let decider = StubDecider::valid(true);
            let mut ctx = make_ctx(Rc::clone(&decider), "/private/public/ping", None, None);

            filter.apply(&mut ctx).await.unwrap();
            assert_eq!(decider.calls.get(), 1, "non-matching path must hit the oracle");
        });
    }

    #[test]
    fn empty_auth_header_counts_as_absent_for_status_choice() {
        block_on(async {
            let filter = AuthorizationFilter::new(&[]).unwrap();
            let decider = StubDecider::valid(false);
            let mut ctx = make_ctx(Rc::clone(&decider), "/user-svc/a", Some(""), None);

            match filter.apply(&mut ctx).await.unwrap() {
                FilterAction::Respond(resp) => assert_eq!(resp.status, 403),
                other => panic!("expected Respond, got {other:?}"),
            }
        });
    }
}
