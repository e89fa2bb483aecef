//! Application state: persistence gateway, optional LLM gateway, config, and the
//! services built on top of them.
//!
//! The store is Supabase/PostgREST when `SUPABASE_URL` is set, otherwise an
//! in-process memory store (dev mode). OpenAI is optional; without it the
//! evaluation endpoints answer 503 and everything else keeps working.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::config::AppConfig;
use crate::evaluation::Evaluator;
use crate::forum::Forum;
use crate::openai::{LlmGateway, OpenAI};
use crate::ranking::Rankings;
use crate::records::Records;
use crate::scheduler::DailyPublisher;
use crate::store::{Db, PostgrestStore, StoreError};
use crate::usage_log::UsageLogs;

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub db: Db,
    pub records: Records,
    pub evaluator: Evaluator,
    pub rankings: Rankings,
    pub logs: UsageLogs,
    pub forum: Forum,
}

impl AppState {
    /// Build state from env: load config, pick the store, init OpenAI.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Result<Self, StoreError> {
        let config = AppConfig::from_env();

        let db = match PostgrestStore::from_env() {
            Some(store) => {
                let store = store?;
                info!(target: "thinkscore", rest_url = %store.rest_url(), "Using Supabase REST store.");
                Db::new(Arc::new(store))
            }
            None => {
                warn!(target: "thinkscore", "SUPABASE_URL not set; using in-memory store (data is lost on restart).");
                Db::memory()
            }
        };

        let openai = OpenAI::from_env();
        if let Some(oa) = &openai {
            info!(target: "thinkscore", base_url = %oa.base_url, model = %config.evaluation.model, "OpenAI enabled.");
        } else {
            info!(target: "thinkscore", "OpenAI disabled (no OPENAI_API_KEY). Answer evaluation returns 503.");
        }
        let llm = openai.map(|oa| Arc::new(oa) as Arc<dyn LlmGateway>);

        Ok(Self::with_parts(db, llm, config))
    }

    pub fn with_parts(db: Db, llm: Option<Arc<dyn LlmGateway>>, config: AppConfig) -> Self {
        Self {
            records: Records::new(db.clone()),
            evaluator: Evaluator::new(db.clone(), llm, &config),
            rankings: Rankings::new(db.clone()),
            logs: UsageLogs::new(db.clone()),
            forum: Forum::new(db.clone()),
            db,
            config,
        }
    }

    pub fn publisher(&self) -> DailyPublisher {
        DailyPublisher::new(self.db.clone())
    }
}
