use std::{ops::Deref, sync::Arc};

use crate::{config::Config, jobs::SchedulerDriver};

pub struct InnerWebContext {
    pub(crate) config: Config,
    pub(crate) driver: Arc<SchedulerDriver>,
}

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct WebContext(pub(crate) Arc<InnerWebContext>);

impl Deref for WebContext {
    type Target = InnerWebContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl WebContext {
    pub fn new(config: Config, driver: Arc<SchedulerDriver>) -> Self {
        Self(Arc::new(InnerWebContext { config, driver }))
    }
}
