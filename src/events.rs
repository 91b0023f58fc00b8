//! Observable engine state delivered to the UI layer.

use std::rc::Rc;

/// Playback state delta. Only the fields that changed are set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateChange {
    pub playing: Option<bool>,
    pub speed: Option<f32>,
}

/// Loading indicator and the last user-facing error, if any.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadState {
    pub loading: bool,
    pub error: Option<String>,
}

impl LoadState {
    pub fn loading() -> Self {
        Self {
            loading: true,
            error: None,
        }
    }

    pub fn loaded() -> Self {
        Self::default()
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            loading: false,
            error: Some(message.into()),
        }
    }
}

/// Optional observers for engine events.
#[derive(Clone, Default)]
pub struct EngineCallbacks {
    on_tick: Option<Rc<dyn Fn(usize)>>,
    on_state_change: Option<Rc<dyn Fn(&StateChange)>>,
    on_load_state_change: Option<Rc<dyn Fn(&LoadState)>>,
}

impl EngineCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the frame index after each completed advance.
    pub fn on_tick(mut self, f: impl Fn(usize) + 'static) -> Self {
        self.on_tick = Some(Rc::new(f));
        self
    }

    pub fn on_state_change(mut self, f: impl Fn(&StateChange) + 'static) -> Self {
        self.on_state_change = Some(Rc::new(f));
        self
    }

    pub fn on_load_state_change(mut self, f: impl Fn(&LoadState) + 'static) -> Self {
        self.on_load_state_change = Some(Rc::new(f));
        self
    }

    pub(crate) fn tick(&self, index: usize) {
        if let Some(f) = &self.on_tick {
            f(index);
        }
    }

    pub(crate) fn state_changed(&self, change: StateChange) {
        if let Some(f) = &self.on_state_change {
            f(&change);
        }
    }

    pub(crate) fn load_state_changed(&self, state: LoadState) {
        if let Some(f) = &self.on_load_state_change {
            f(&state);
        }
    }
}
