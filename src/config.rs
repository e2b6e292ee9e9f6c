use std::rc::Rc;
use derivative::Derivative;
use crate::instance::Instance;

/// Receives errors thrown by user code: the error, the instance owning the failing
/// watcher (if any), and a label describing where it happened.
pub type ErrorHandler = Rc<dyn Fn(&anyhow::Error, Option<&Instance>, &str)>;

/// Receives development-mode diagnostics. Purely advisory.
pub type WarnHandler = Rc<dyn Fn(&str, Option<&Instance>)>;

/// How many times one watcher may be re-queued during a single flush before the flush is
/// declared an infinite update loop.
pub const DEFAULT_MAX_UPDATE_COUNT: usize = 100;

/// Settings for a [crate::Reactor].
#[derive(Clone, Derivative)]
#[derivative(Debug, Default)]
pub struct Config {
    /// Production mode: no warnings, no custom-setter hooks.
    pub production: bool,
    /// Suppress warnings even in development mode.
    pub silent: bool,
    /// If false, queued watchers are flushed as soon as they are queued instead of waiting
    /// for [crate::Reactor::flush].
    #[derivative(Default(value = "true"))]
    pub async_updates: bool,
    #[derivative(Default(value = "DEFAULT_MAX_UPDATE_COUNT"))]
    pub max_update_count: usize,
    #[derivative(Debug = "ignore")]
    pub error_handler: Option<ErrorHandler>,
    #[derivative(Debug = "ignore")]
    pub warn_handler: Option<WarnHandler>,
}

impl Config {
    pub fn with_production(mut self, production: bool) -> Self {
        self.production = production;
        self
    }

    pub fn with_silent(mut self, silent: bool) -> Self {
        self.silent = silent;
        self
    }

    pub fn with_async_updates(mut self, async_updates: bool) -> Self {
        self.async_updates = async_updates;
        self
    }

    pub fn with_max_update_count(mut self, max_update_count: usize) -> Self {
        self.max_update_count = max_update_count;
        self
    }

    pub fn with_error_handler(mut self, handler: impl Fn(&anyhow::Error, Option<&Instance>, &str) + 'static) -> Self {
        self.error_handler = Some(Rc::new(handler));
        self
    }

    pub fn with_warn_handler(mut self, handler: impl Fn(&str, Option<&Instance>) + 'static) -> Self {
        self.warn_handler = Some(Rc::new(handler));
        self
    }

    pub(crate) fn warnings_enabled(&self) -> bool {
        !self.production && !self.silent
    }
}
