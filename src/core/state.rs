use std::sync::Arc;

use crate::core::{config::Settings, time::Clock};
use crate::repositories::Store;
use crate::services::essay_assist::EssayAssist;
use crate::services::events::EventBus;

#[derive(Clone)]
pub(crate) struct AppState {
    inner: Arc<InnerState>,
}

struct InnerState {
    settings: Settings,
    store: Arc<dyn Store>,
    events: EventBus,
    clock: Clock,
    assist: Option<Arc<dyn EssayAssist>>,
}

impl AppState {
    pub(crate) fn new(
        settings: Settings,
        store: Arc<dyn Store>,
        events: EventBus,
        clock: Clock,
        assist: Option<Arc<dyn EssayAssist>>,
    ) -> Self {
        Self { inner: Arc::new(InnerState { settings, store, events, clock, assist }) }
    }

    pub(crate) fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    pub(crate) fn store(&self) -> &dyn Store {
        self.inner.store.as_ref()
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub(crate) fn clock(&self) -> &Clock {
        &self.inner.clock
    }

    pub(crate) fn assist(&self) -> Option<&dyn EssayAssist> {
        self.inner.assist.as_deref()
    }
}
