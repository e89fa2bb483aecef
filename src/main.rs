//! ThinkScore backend
//!
//! - Axum HTTP API: questions, answers, scores, profiles, rankings, usage logs, forum
//! - AI answer evaluation through OpenAI (optional)
//! - Supabase REST persistence, or an in-memory store for local runs
//!
//! Important env variables:
//!   PORT                      : u16 (default 3001)
//!   SUPABASE_URL              : PostgREST base; unset → in-memory store
//!   SUPABASE_SERVICE_ROLE_KEY : service key used with SUPABASE_URL
//!   OPENAI_API_KEY            : enables answer evaluation if present
//!   OPENAI_BASE_URL           : default "https://api.openai.com/v1"
//!   OPENAI_EVAL_MODEL         : default "gpt-5-nano"
//!   THINKSCORE_CONFIG_PATH    : path to TOML config (prompts, evaluation and scheduler policy)
//!   CORS_ORIGINS              : comma separated allow-list (default any)
//!   LOG_LEVEL                 : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT                : "pretty" (default) or "json"

mod config;
mod domain;
mod error;
mod evaluation;
mod forum;
mod openai;
mod protocol;
mod ranking;
mod records;
mod routes;
mod scheduler;
mod state;
mod store;
mod telemetry;
mod usage_log;
mod util;

use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::scheduler::spawn_daily_publish;
use crate::state::AppState;

const DEFAULT_PORT: u16 = 3001;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared state: store, optional OpenAI client, config-driven services.
  let state = Arc::new(AppState::new()?);

  let sched = &state.config.scheduler;
  if sched.enabled {
    let every = Duration::from_secs(sched.interval_secs.max(1));
    spawn_daily_publish(state.publisher(), every);
    info!(target: "scheduler", interval_secs = every.as_secs(), "daily publish job started");
  } else {
    info!(target: "scheduler", "daily publish job disabled");
  }

  let app = build_router(state.clone());

  let port = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .unwrap_or(DEFAULT_PORT);
  let addr = SocketAddr::from(([0, 0, 0, 0], port));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "thinkscore", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
      info!(target: "thinkscore", "shutdown signal received");
    })
    .await?;
  Ok(())
}
