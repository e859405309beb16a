//! End-to-end tests for the request lifecycle
//!
//! These drive envelopes through the adapter and the worker the way a
//! serverless host would.

use std::{
    sync::{Arc, Mutex},
    thread,
};

use http::Method;
use serde_json::json;

use super::*;
use crate::{
    config::{Config, FailureBody},
    core::{
        scope, Application, BridgeError, ContextId, DispatchResult, EventKind, ExecutionContext,
        Failure, InternalResponse, LifecycleEvent, RequestDescriptor, RouteParams,
    },
};

const CONF: &str = r#"
bridge:
  failure_body: diagnostic
bindings:
  app.name: demo
routes:
  - id: hello
    uri: /
    handler: echo
    options:
      body: Hello World
      headers:
        Foo: Bar
        X-Multi: [one, two]
  - id: bind
    uri: /bind
    handler: bind
    options:
      key: counter
      value: "1"
  - id: bound
    uri: /bound
    handler: bound
    options:
      key: counter
  - id: fail
    uri: /fail
    handler: fail
    options:
      message: x
  - id: panic
    uri: /panic
    handler: fail
    options:
      mode: panic
"#;

fn init_log() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn worker() -> Worker {
    init_log();
    Worker::boot(&Config::from_yaml(CONF).unwrap()).unwrap()
}

fn record_events(worker: &Worker) -> Arc<Mutex<Vec<(EventKind, String)>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    worker
        .adapter()
        .application()
        .listeners()
        .register(Arc::new(Recorder { sink }));
    events
}

struct Recorder {
    sink: Arc<Mutex<Vec<(EventKind, String)>>>,
}

impl crate::core::LifecycleListener for Recorder {
    fn name(&self) -> &str {
        "recorder"
    }

    fn handle(&self, event: &LifecycleEvent<'_>) {
        self.sink
            .lock()
            .unwrap()
            .push((event.kind(), event.request().id().to_string()));
    }
}

#[test]
fn test_hello_world() {
    let worker = worker();
    let response = worker.handle(&json!({ "httpMethod": "GET" })).unwrap();

    assert_eq!(response.status_code, 200);
    assert_eq!(response.body_text(), Some("Hello World"));
}

#[test]
fn test_body_and_headers_reach_gateway_format() {
    let worker = worker();
    let gateway = worker
        .handle(&json!({ "httpMethod": "GET", "path": "/" }))
        .unwrap()
        .to_gateway_format();

    assert_eq!(gateway.body, "Hello World");
    assert_eq!(gateway.multi_value_headers["Foo"], vec!["Bar".to_string()]);
    assert_eq!(
        gateway.multi_value_headers["X-Multi"],
        vec!["one".to_string(), "two".to_string()]
    );
    assert_eq!(gateway.headers["X-Multi"], "two");
}

#[test]
fn test_unhandled_failure_is_500() {
    let worker = worker();
    let response = worker
        .handle(&json!({ "httpMethod": "GET", "path": "/fail" }))
        .unwrap();

    assert_eq!(response.status_code, 500);
    assert_eq!(response.body_text(), Some("x"));
}

#[test]
fn test_panic_is_500() {
    let worker = worker();
    let response = worker
        .handle(&json!({ "httpMethod": "GET", "path": "/panic" }))
        .unwrap();

    assert_eq!(response.status_code, 500);
    assert_eq!(response.body_text(), Some("Something wrong happened."));
    assert_eq!(scope::depth(), 0);
}

#[test]
fn test_events_emitted_once_in_order() {
    let worker = worker();
    let events = record_events(&worker);

    for path in ["/", "/fail", "/panic"] {
        events.lock().unwrap().clear();
        let request = json!({
            "httpMethod": "GET",
            "path": path,
            "requestContext": { "requestId": format!("req{path}") }
        });
        worker.handle(&request).unwrap();

        let expected = format!("req{path}");
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                (EventKind::Received, expected.clone()),
                (EventKind::Terminated, expected),
            ],
            "unexpected events for {path}"
        );
    }
}

#[test]
fn test_terminated_carries_the_returned_response() {
    let worker = worker();
    let seen = Arc::new(Mutex::new(None));
    let slot = seen.clone();
    worker
        .adapter()
        .application()
        .listeners()
        .on_terminated(move |event| {
            if let LifecycleEvent::Terminated { response, .. } = event {
                *slot.lock().unwrap() = Some((*response).clone());
            }
        });

    let response = worker
        .handle(&json!({ "httpMethod": "GET", "path": "/fail" }))
        .unwrap();
    assert_eq!(seen.lock().unwrap().as_ref(), Some(&response));
}

#[test]
fn test_bindings_do_not_leak_between_requests() {
    let worker = worker();

    let first = worker
        .handle(&json!({ "httpMethod": "GET", "path": "/bind" }))
        .unwrap();
    assert_eq!(first.body_text(), Some("1"));

    let second = worker
        .handle(&json!({ "httpMethod": "GET", "path": "/bound" }))
        .unwrap();
    assert_eq!(second.body_text(), Some("not bound"));
}

#[test]
fn test_prototype_bindings_are_visible() {
    let worker = worker();
    assert!(worker.adapter().application().bound("app.name"));
}

#[test]
fn test_missing_path_defaults_to_root() {
    let worker = worker();
    let seen = Arc::new(Mutex::new(String::new()));
    let slot = seen.clone();
    worker
        .adapter()
        .application()
        .listeners()
        .on_received(move |event| *slot.lock().unwrap() = event.request().path().to_string());

    worker.handle(&json!({ "httpMethod": "GET" })).unwrap();
    assert_eq!(*seen.lock().unwrap(), "/");
}

#[test]
fn test_invalid_envelope_emits_no_events() {
    let worker = worker();
    let events = record_events(&worker);

    let err = worker.handle(&json!({ "path": "/" })).unwrap_err();
    assert!(matches!(err, BridgeError::InvalidEnvelope(_)));
    assert!(events.lock().unwrap().is_empty());
    assert_eq!(scope::depth(), 0);
}

#[test]
fn test_listeners_observe_active_scope() {
    let worker = worker();
    let scopes: Arc<Mutex<Vec<Option<ContextId>>>> = Arc::new(Mutex::new(Vec::new()));

    let received = scopes.clone();
    let terminated = scopes.clone();
    let listeners = worker.adapter().application().listeners();
    listeners.on_received(move |_| received.lock().unwrap().push(scope::current()));
    listeners.on_terminated(move |_| terminated.lock().unwrap().push(scope::current()));

    worker.handle(&json!({ "httpMethod": "GET" })).unwrap();

    let scopes = scopes.lock().unwrap();
    assert_eq!(scopes.len(), 2);
    assert!(scopes[0].is_some());
    assert_eq!(scopes[0], scopes[1]);
    assert_eq!(scope::current(), None);
}

#[test]
fn test_unknown_route_is_404_not_failure() {
    let worker = worker();
    let response = worker
        .handle(&json!({ "httpMethod": "GET", "path": "/nowhere" }))
        .unwrap();
    assert_eq!(response.status_code, 404);
}

#[test]
fn test_worker_stats() {
    let worker = worker();
    worker.handle(&json!({ "httpMethod": "GET" })).unwrap();
    worker
        .handle(&json!({ "httpMethod": "GET", "path": "/fail" }))
        .unwrap();
    let _ = worker.handle(&json!({}));

    assert_eq!(
        worker.terminate(),
        WorkerStats {
            handled: 2,
            failed: 1,
            rejected: 1,
        }
    );
}

#[test]
fn test_generic_failure_body_by_default() {
    init_log();
    let mut router = RequestRouter::new();
    router
        .route(
            "boom",
            "/",
            vec![Method::GET],
            Arc::new(
                |_: &RequestDescriptor,
                 _: &RouteParams,
                 _: &mut ExecutionContext|
                 -> DispatchResult { Err(Failure::new("secret detail")) },
            ),
        )
        .unwrap();
    let adapter = DispatcherAdapter::new(Application::new(), Arc::new(router));
    assert_eq!(adapter.failure_body(), FailureBody::Generic);

    let response = adapter.handle_request(RequestDescriptor::new(Method::GET, "/"));
    assert_eq!(response.status_code, 500);
    assert_eq!(response.body_text(), Some("Internal Server Error"));
}

#[test]
fn test_concurrent_handles_are_isolated() {
    init_log();
    let mut router = RequestRouter::new();
    router
        .route(
            "isolation",
            "/isolation",
            vec![Method::GET],
            Arc::new(
                |request: &RequestDescriptor,
                 _: &RouteParams,
                 ctx: &mut ExecutionContext|
                 -> DispatchResult {
                    if ctx.bound("marker") {
                        return Err(Failure::new("binding leaked into a fresh context"));
                    }
                    ctx.instance("marker", request.id().to_string());
                    thread::yield_now();
                    let seen = ctx.make::<String>("marker")?;
                    if seen.as_str() != request.id() {
                        return Err(Failure::new("binding from another request"));
                    }
                    if scope::current() != Some(ctx.id()) {
                        return Err(Failure::new("wrong scope"));
                    }
                    Ok(InternalResponse::new(request.id().to_string()))
                },
            ),
        )
        .unwrap();
    let adapter = Arc::new(
        DispatcherAdapter::new(Application::new(), Arc::new(router))
            .with_failure_body(FailureBody::Diagnostic),
    );

    let workers: Vec<_> = (0..8)
        .map(|t| {
            let adapter = adapter.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    let id = format!("t{t}-r{i}");
                    let request =
                        RequestDescriptor::new(Method::GET, "/isolation").with_id(id.clone());
                    let response = adapter.handle_request(request);
                    assert_eq!(response.status_code, 200, "{:?}", response.body_text());
                    assert_eq!(response.body_text(), Some(id.as_str()));
                }
                assert_eq!(scope::depth(), 0);
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap();
    }
}

#[test]
fn test_dispatch_runs_between_received_and_terminated() {
    init_log();
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));

    let mut router = RequestRouter::new();
    let sink = log.clone();
    router
        .route(
            "ok",
            "/ok",
            vec![Method::GET],
            Arc::new(
                move |_: &RequestDescriptor,
                      _: &RouteParams,
                      _: &mut ExecutionContext|
                      -> DispatchResult {
                    sink.lock().unwrap().push("dispatch");
                    Ok(InternalResponse::new("ok"))
                },
            ),
        )
        .unwrap();
    let sink = log.clone();
    router
        .route(
            "failure",
            "/failure",
            vec![Method::GET],
            Arc::new(
                move |_: &RequestDescriptor,
                      _: &RouteParams,
                      _: &mut ExecutionContext|
                      -> DispatchResult {
                    sink.lock().unwrap().push("dispatch");
                    Err(Failure::new("failed"))
                },
            ),
        )
        .unwrap();
    let sink = log.clone();
    router
        .route(
            "panic",
            "/panic",
            vec![Method::GET],
            Arc::new(
                move |_: &RequestDescriptor,
                      _: &RouteParams,
                      _: &mut ExecutionContext|
                      -> DispatchResult {
                    sink.lock().unwrap().push("dispatch");
                    panic!("dispatcher panicked");
                },
            ),
        )
        .unwrap();

    let adapter = DispatcherAdapter::new(Application::new(), Arc::new(router));
    let listeners = adapter.application().listeners();
    let received = log.clone();
    let terminated = log.clone();
    listeners.on_received(move |_| received.lock().unwrap().push("received"));
    listeners.on_terminated(move |_| terminated.lock().unwrap().push("terminated"));

    for (path, status) in [("/ok", 200), ("/failure", 500), ("/panic", 500)] {
        log.lock().unwrap().clear();
        let response = adapter.handle_request(RequestDescriptor::new(Method::GET, path));

        assert_eq!(response.status_code, status, "unexpected status for {path}");
        assert_eq!(
            *log.lock().unwrap(),
            vec!["received", "dispatch", "terminated"],
            "unexpected order for {path}"
        );
    }
    assert_eq!(scope::depth(), 0);
}
