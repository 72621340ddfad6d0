//! Aula command-line client.
//!
//! Loads the configuration, signs in with the configured session and prints
//! the requested dashboard reads as JSON:
//!
//! ```text
//! aula --config aula.toml [history|recommendations|exams|enrollments|statistics|plans]...
//! ```

use std::sync::Arc;

use aula_cache::{spawn_gc_task, QueryState};
use aula_client::{AppContext, AulaConfig, ClientError, NotificationSink, SessionAuthProvider, TracingSink};
use serde::Serialize;
use serde_json::{json, Map, Value};

const VIEWS: &[&str] = &["history", "recommendations", "exams", "enrollments", "statistics", "plans"];

#[tokio::main]
async fn main() -> Result<(), ClientError> {
    let config = AulaConfig::load()?;
    aula_client::telemetry::init_tracing(&config.log)?;

    let auth = Arc::new(SessionAuthProvider::from_config(&config.auth));
    let sink: Arc<dyn NotificationSink> = Arc::new(TracingSink);
    let context = AppContext::from_config(&config, auth, sink)?;
    let listener = context.spawn_auth_listener();
    let gc = spawn_gc_task(context.queries().clone(), config.gc_interval());

    let mut output = Map::new();
    for view in requested_views() {
        output.insert(view.clone(), render(&context, &view).await);
    }
    println!("{}", serde_json::to_string_pretty(&Value::Object(output))?);

    gc.abort();
    if let Some(listener) = listener {
        listener.abort();
    }
    Ok(())
}

fn requested_views() -> Vec<String> {
    let mut views = Vec::new();
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            args.next();
            continue;
        }
        views.push(arg);
    }
    if views.is_empty() {
        views = VIEWS.iter().map(|v| v.to_string()).collect();
    }
    views
}

async fn render(context: &AppContext, view: &str) -> Value {
    match view {
        "history" => state_json(&context.academic_history().await),
        "recommendations" => {
            // Recommendations are gated on a cached history.
            context.academic_history().await;
            state_json(&context.recommendations().await)
        }
        "exams" => json!({
            "sessions": state_json(&context.exam_sessions().await),
            "registrations": state_json(&context.exam_registrations().await),
            "pending_review": state_json(&context.exams_pending_review().await),
        }),
        "enrollments" => json!({
            "available": state_json(&context.available_subjects().await),
            "enrolled": state_json(&context.enrollments().await),
        }),
        "statistics" => json!({
            "general": state_json(&context.general_statistics().await),
            "admin": state_json(&context.admin_statistics().await),
        }),
        "plans" => state_json(&context.plans().await),
        other => json!({ "error": format!("unknown view '{}'; expected one of {}", other, VIEWS.join(", ")) }),
    }
}

fn state_json<T: Serialize>(state: &QueryState<T>) -> Value {
    json!({
        "status": state.status(),
        "enabled": state.is_enabled(),
        "stale": state.is_stale(),
        "fetched_at": state.fetched_at(),
        "data": state.data(),
        "error": state.error().map(|e| e.to_string()),
    })
}
