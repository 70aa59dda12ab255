use async_trait::async_trait;
use gatekeeper_core::GatewayError;
use gatekeeper_core::trace::{ROLE_NO_KEY, USER_ID_KEY, USER_NO_KEY, USERNAME_KEY};
use gatekeeper_filter::{Filter, FilterAction, ProxyContext};

/// Trace enricher.
///
/// For authenticated callers, replaces the context's tracing handle with
/// a derived handle annotated with the user's identity. The annotations
/// travel as outbound headers on every call the request makes from here
/// on, and the request log reads the ids from the final handle.
pub struct TraceEnricherFilter;

#[async_trait(?Send)]
impl Filter for TraceEnricherFilter {
    fn name(&self) -> &str {
        "trace-enrich"
    }

    async fn apply(&self, ctx: &mut ProxyContext) -> Result<FilterAction, GatewayError> {
        let Some(user) = ctx.user() else {
            return Ok(FilterAction::Continue);
        };

        ctx.trace = ctx.trace.annotated([
            (USER_ID_KEY, user.id.as_str()),
            (USERNAME_KEY, user.username.as_str()),
            (USER_NO_KEY, user.user_no.as_str()),
            (ROLE_NO_KEY, user.role_no.as_str()),
        ]);

        Ok(FilterAction::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatekeeper_core::TraceContext;
    use gatekeeper_core::User;
    use gatekeeper_core::access::{AccessDecisionRequest, AccessDecisionResponse};
    use gatekeeper_filter::{AccessDecider, InboundRequest};
    use std::rc::Rc;

    fn block_on<F: std::future::Future>(fut: F) -> F::Output {
        let mut rt = monoio::RuntimeBuilder::<monoio::LegacyDriver>::new()
            .build()
            .expect("build runtime");
        rt.block_on(fut)
    }

    struct AllowAll;

    #[async_trait(?Send)]
    impl AccessDecider for AllowAll {
        async fn test_resource_access(
            &self,
            _trace: &TraceContext,
            _req: AccessDecisionRequest,
        ) -> Result<AccessDecisionResponse, GatewayError> {
            Ok(AccessDecisionResponse { valid: true })
        }
    }

    fn make_ctx(user: Option<User>) -> ProxyContext {
        let mut ctx = ProxyContext::new(
            TraceContext::root(),
            InboundRequest {
                method: "GET".into(),
                path: "/svc/a".into(),
                raw_query: String::new(),
                headers: vec![],
            },
            Rc::new(AllowAll),
        );
        if let Some(u) = user {
            ctx.set_user(u);
        }
        ctx
    }

    #[test]
    fn anonymous_request_is_untouched() {
        block_on(async {
            let mut ctx = make_ctx(None);
            let before = ctx.trace.clone();
            let action = TraceEnricherFilter.apply(&mut ctx).await.unwrap();
            assert!(matches!(action, FilterAction::Continue));
            assert_eq!(ctx.trace, before);
        });
    }

    #[test]
    fn authenticated_request_gets_annotated_handle() {
        block_on(async {
            let mut ctx = make_ctx(Some(User {
                id: "1001".into(),
                username: "alice".into(),
                user_no: "UE1001".into(),
                role_no: "admin".into(),
            }));
            let original_trace_id = ctx.trace.trace_id().to_string();

            TraceEnricherFilter.apply(&mut ctx).await.unwrap();

            assert_eq!(ctx.trace.annotation(USER_ID_KEY), Some("1001"));
            assert_eq!(ctx.trace.annotation(USERNAME_KEY), Some("alice"));
            assert_eq!(ctx.trace.annotation(USER_NO_KEY), Some("UE1001"));
            assert_eq!(ctx.trace.annotation(ROLE_NO_KEY), Some("admin"));
            // trace identity is preserved across the replacement
            assert_eq!(ctx.trace.trace_id(), original_trace_id);
        });
    }

    #[test]
    fn annotations_become_propagation_headers() {
        block_on(async {
            let mut ctx = make_ctx(Some(User {
                id: "7".into(),
                username: "bob".into(),
                user_no: "UE7".into(),
                role_no: "user".into(),
            }));
            TraceEnricherFilter.apply(&mut ctx).await.unwrap();

            let headers = ctx.trace.propagation_headers();
            for key in [USER_ID_KEY, USERNAME_KEY, USER_NO_KEY, ROLE_NO_KEY] {
                assert!(
                    headers.iter().any(|(k, _)| k == key),
                    "missing propagation header {key}"
                );
            }
        });
    }

    #[test]
    fn empty_claim_fields_still_annotate() {
        block_on(async {
            let mut ctx = make_ctx(Some(User::default()));
            TraceEnricherFilter.apply(&mut ctx).await.unwrap();
            assert_eq!(ctx.trace.annotation(USER_ID_KEY), Some(""));
        });
    }
}
