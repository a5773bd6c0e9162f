//! Tests for the per-request dispatch pipeline

use dispatch_engine::dispatch::filter::FilterSpec;
use dispatch_engine::dispatch::rewrite::RewriteSpec;
use dispatch_engine::dispatch::router::RouteSpec;
use dispatch_engine::http::request::{Request, RequestBuilder};
use dispatch_engine::{DispatchDecision, DispatchError, Dispatcher, Transport};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

fn request(path: &str) -> Request {
    RequestBuilder::new()
        .path(path)
        .host("localhost:3000")
        .build()
        .unwrap()
}

#[derive(Default)]
struct RecordingTransport {
    forwarded: Mutex<Vec<DispatchDecision>>,
}

impl Transport for RecordingTransport {
    async fn forward(&self, _request: &Request, decision: &DispatchDecision) -> anyhow::Result<()> {
        self.forwarded.lock().unwrap().push(decision.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_end_to_end_scenario() {
    let dispatcher = Dispatcher::builder()
        .target("http://A")
        .filter(FilterSpec::from_pattern("/api"))
        .router(RouteSpec::table([("/api", "http://B")]))
        .rewrite(RewriteSpec::rules([("^/api", "/v2")]))
        .build()
        .unwrap();

    let decision = dispatcher.dispatch(&request("/api/x?y=1")).await.unwrap();

    assert_eq!(
        decision,
        DispatchDecision {
            proxy: true,
            target: Some("http://B".to_string()),
            path: "/v2/x?y=1".to_string(),
        }
    );
}

#[tokio::test]
async fn test_defaults_proxy_everything_unchanged() {
    let dispatcher = Dispatcher::builder().target("http://A").build().unwrap();

    let decision = dispatcher.dispatch(&request("/any/path?q")).await.unwrap();

    assert!(decision.proxy);
    assert_eq!(decision.target.as_deref(), Some("http://A"));
    assert_eq!(decision.path, "/any/path?q");
}

#[tokio::test]
async fn test_filter_rejection_skips_routing_and_rewriting() {
    let router_calls = Arc::new(AtomicUsize::new(0));
    let rewrite_calls = Arc::new(AtomicUsize::new(0));

    let r = router_calls.clone();
    let w = rewrite_calls.clone();
    let dispatcher = Dispatcher::builder()
        .target("http://A")
        .filter(FilterSpec::from_pattern("/api"))
        .router(RouteSpec::from_sync_fn(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(Some("http://B".to_string()))
        }))
        .rewrite(RewriteSpec::from_sync_fn(move |path, _| {
            w.fetch_add(1, Ordering::SeqCst);
            Ok(path.to_string())
        }))
        .build()
        .unwrap();

    let decision = dispatcher.dispatch(&request("/web/index.html")).await.unwrap();

    assert!(!decision.proxy);
    assert_eq!(decision.target, None);
    assert_eq!(decision.path, "/web/index.html");
    assert_eq!(router_calls.load(Ordering::SeqCst), 0);
    assert_eq!(rewrite_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_filter_predicate_error_stops_pipeline() {
    let router_calls = Arc::new(AtomicUsize::new(0));
    let rewrite_calls = Arc::new(AtomicUsize::new(0));

    let r = router_calls.clone();
    let w = rewrite_calls.clone();
    let dispatcher = Dispatcher::builder()
        .target("http://A")
        .filter(FilterSpec::predicate(|_, _| anyhow::bail!("policy store unreachable")))
        .router(RouteSpec::from_sync_fn(move |_| {
            r.fetch_add(1, Ordering::SeqCst);
            Ok(Some("http://B".to_string()))
        }))
        .rewrite(RewriteSpec::from_sync_fn(move |path, _| {
            w.fetch_add(1, Ordering::SeqCst);
            Ok(path.to_string())
        }))
        .build()
        .unwrap();

    let result = dispatcher.dispatch(&request("/api/x")).await;

    match result {
        Err(DispatchError::FilterPredicate(e)) => {
            assert_eq!(e.to_string(), "policy store unreachable")
        }
        other => panic!("expected filter predicate error, got {other:?}"),
    }
    assert_eq!(router_calls.load(Ordering::SeqCst), 0);
    assert_eq!(rewrite_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_filter_predicate_error_never_reaches_transport() {
    let dispatcher = Dispatcher::builder()
        .target("http://A")
        .filter(FilterSpec::predicate(|_, _| anyhow::bail!("policy store unreachable")))
        .build()
        .unwrap();
    let transport = RecordingTransport::default();

    let result = dispatcher.forward(&transport, &request("/api/x")).await;

    assert!(result.is_err());
    assert!(transport.forwarded.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_absolute_and_origin_form_dispatch_alike() {
    let dispatcher = Dispatcher::builder()
        .target("http://static")
        .filter(FilterSpec::from_pattern("/x"))
        .router(RouteSpec::table([("/a", "http://A")]))
        .build()
        .unwrap();

    let origin = dispatcher.dispatch(&request("/x/../a/y")).await.unwrap();
    let absolute = dispatcher
        .dispatch(&request("http://localhost:3000/x/../a/y"))
        .await
        .unwrap();

    assert!(origin.proxy && absolute.proxy);
    assert_eq!(origin.target.as_deref(), Some("http://static"));
    assert_eq!(absolute.target, origin.target);
}

#[tokio::test]
async fn test_router_and_rewriter_see_original_path_in_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));

    let router_seen = seen.clone();
    let rewrite_seen = seen.clone();
    let dispatcher = Dispatcher::builder()
        .target("http://A")
        .router(RouteSpec::from_fn(move |req: &Request| {
            let seen = router_seen.clone();
            let path = req.path.clone();
            async move {
                tokio::task::yield_now().await;
                seen.lock().unwrap().push(format!("router:{path}"));
                Ok::<_, anyhow::Error>(None)
            }
        }))
        .rewrite(RewriteSpec::from_fn(move |path: &str, _: &Request| {
            let seen = rewrite_seen.clone();
            let path = path.to_string();
            async move {
                seen.lock().unwrap().push(format!("rewrite:{path}"));
                Ok::<_, anyhow::Error>(path.replace("/old", "/new"))
            }
        }))
        .build()
        .unwrap();

    let decision = dispatcher.dispatch(&request("/old/x")).await.unwrap();

    assert_eq!(decision.path, "/new/x");
    assert_eq!(
        *seen.lock().unwrap(),
        vec!["router:/old/x".to_string(), "rewrite:/old/x".to_string()]
    );
}

#[tokio::test]
async fn test_router_table_matches_before_rewrite() {
    // The rewrite moves "/legacy" to "/api", but routing uses "/legacy"
    let dispatcher = Dispatcher::builder()
        .target("http://default")
        .router(RouteSpec::table([
            ("/api", "http://api"),
            ("/legacy", "http://legacy"),
        ]))
        .rewrite(RewriteSpec::rules([("^/legacy", "/api")]))
        .build()
        .unwrap();

    let decision = dispatcher.dispatch(&request("/legacy/users")).await.unwrap();

    assert_eq!(decision.target.as_deref(), Some("http://legacy"));
    assert_eq!(decision.path, "/api/users");
}

#[tokio::test]
async fn test_router_override_is_per_request() {
    let dispatcher = Dispatcher::builder()
        .target("http://static")
        .router(RouteSpec::table([("/api", "http://api")]))
        .build()
        .unwrap();

    let first = dispatcher.dispatch(&request("/api/x")).await.unwrap();
    let second = dispatcher.dispatch(&request("/web/x")).await.unwrap();

    assert_eq!(first.target.as_deref(), Some("http://api"));
    assert_eq!(second.target.as_deref(), Some("http://static"));
    assert_eq!(dispatcher.target(), Some("http://static"));
}

#[tokio::test]
async fn test_filter_and_router_disagree_on_prefix() {
    let dispatcher = Dispatcher::builder()
        .target("http://static")
        .filter(FilterSpec::from_pattern("/api"))
        .router(RouteSpec::table([("/api", "http://api")]))
        .build()
        .unwrap();

    // Character prefix passes the filter; segment-aware router does not match
    let decision = dispatcher.dispatch(&request("/apiary")).await.unwrap();

    assert!(decision.proxy);
    assert_eq!(decision.target.as_deref(), Some("http://static"));
}

#[tokio::test]
async fn test_router_error_has_no_fallback() {
    let dispatcher = Dispatcher::builder()
        .target("http://static")
        .router(RouteSpec::from_sync_fn(|_| anyhow::bail!("registry down")))
        .build()
        .unwrap();

    let result = dispatcher.dispatch(&request("/api")).await;

    assert!(matches!(result, Err(DispatchError::RouterResolution(_))));
}

#[tokio::test]
async fn test_rewrite_error_propagated() {
    let dispatcher = Dispatcher::builder()
        .target("http://static")
        .rewrite(RewriteSpec::from_sync_fn(|_, _| anyhow::bail!("bad path")))
        .build()
        .unwrap();

    let result = dispatcher.dispatch(&request("/api")).await;

    assert!(matches!(result, Err(DispatchError::Rewrite(_))));
}

#[tokio::test]
async fn test_router_only_without_static_target() {
    let dispatcher = Dispatcher::builder()
        .router(RouteSpec::table([("/api", "http://api")]))
        .build()
        .unwrap();

    let routed = dispatcher.dispatch(&request("/api/x")).await.unwrap();
    let unrouted = dispatcher.dispatch(&request("/web")).await.unwrap();

    assert_eq!(routed.target.as_deref(), Some("http://api"));
    assert!(unrouted.proxy);
    assert_eq!(unrouted.target, None);
}

#[test]
fn test_missing_target_rejected() {
    let result = Dispatcher::builder().filter(FilterSpec::from_pattern("/api")).build();

    assert!(matches!(result, Err(DispatchError::MissingTarget)));
}

#[test]
fn test_invalid_specs_fail_at_build() {
    let result = Dispatcher::builder()
        .target("http://A")
        .filter(FilterSpec::ListOfPlain(vec!["/api".into(), "/x/**".into()]))
        .build();
    assert!(matches!(result, Err(DispatchError::InvalidFilterSpec(_))));

    let result = Dispatcher::builder()
        .target("http://A")
        .rewrite(RewriteSpec::Rules(vec![]))
        .build();
    assert!(matches!(result, Err(DispatchError::InvalidRewriteConfig(_))));
}

#[tokio::test]
async fn test_forward_hands_proxied_decisions_to_transport() {
    let dispatcher = Dispatcher::builder()
        .target("http://A")
        .filter(FilterSpec::from_pattern("/api"))
        .build()
        .unwrap();
    let transport = RecordingTransport::default();

    let proxied = dispatcher.forward(&transport, &request("/api/x")).await.unwrap();
    let skipped = dispatcher.forward(&transport, &request("/web")).await.unwrap();

    assert!(proxied.proxy);
    assert!(!skipped.proxy);
    assert_eq!(*transport.forwarded.lock().unwrap(), vec![proxied]);
}

#[tokio::test]
async fn test_dispatcher_shared_across_tasks() {
    let dispatcher = Arc::new(
        Dispatcher::builder()
            .target("http://static")
            .router(RouteSpec::table([("/a", "http://a"), ("/b", "http://b")]))
            .build()
            .unwrap(),
    );

    let mut handles = Vec::new();
    for (path, expected) in [("/a/1", "http://a"), ("/b/2", "http://b"), ("/c", "http://static")] {
        let dispatcher = dispatcher.clone();
        handles.push(tokio::spawn(async move {
            let decision = dispatcher.dispatch(&request(path)).await.unwrap();
            assert_eq!(decision.target.as_deref(), Some(expected));
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }
}
