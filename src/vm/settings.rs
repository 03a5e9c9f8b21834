use rustc_hash::FxHashMap;

/// Numeric parameters of the target machine that the stack-effect table depends on.
///
/// The interpreter represents an active exception as a fixed number of stack slots
/// and entering a handler pushes a whole frame of them.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    inner: FxHashMap<Setting, i32>,
}

impl Settings {
    pub fn new() -> Self {
        Self {
            inner: FxHashMap::default(),
        }
    }

    pub fn set(&mut self, setting: Setting, value: i32) {
        self.inner.insert(setting, value);
    }

    pub fn with(mut self, setting: Setting, value: i32) -> Self {
        self.set(setting, value);
        self
    }

    /// Returns the configured value, falling back to the setting's default
    pub fn get(&self, setting: &Setting) -> i32 {
        match self.inner.get(setting) {
            Some(v) => *v,
            _ => setting.default_value(),
        }
    }

    #[inline]
    pub fn handler_frame_size(&self) -> i32 {
        self.get(&Setting::HandlerFrameSize)
    }

    #[inline]
    pub fn exception_state_size(&self) -> i32 {
        self.get(&Setting::ExceptionStateSize)
    }

    pub fn as_vec(&self) -> Vec<(Setting, i32)> {
        let mut settings = self
            .inner
            .iter()
            .map(|p| (p.0.clone(), *p.1))
            .collect::<Vec<_>>();
        settings.sort_by_key(|(s, _)| s.to_string());
        settings
    }
}

impl Default for Settings {
    fn default() -> Settings {
        let mut settings = Settings::new();

        settings.set(
            Setting::HandlerFrameSize,
            Setting::HandlerFrameSize.default_value(),
        );
        settings.set(
            Setting::ExceptionStateSize,
            Setting::ExceptionStateSize.default_value(),
        );

        settings
    }
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub enum Setting {
    /// Slots pushed when control enters an exception handler
    HandlerFrameSize,
    /// Slots that make up one saved exception state
    ExceptionStateSize,
}

impl Setting {
    pub fn default_value(&self) -> i32 {
        match self {
            Setting::HandlerFrameSize => 6,
            Setting::ExceptionStateSize => 3,
        }
    }
}

impl std::fmt::Display for Setting {
    fn fmt(&self, fmt: &mut std::fmt::Formatter<'_>) -> std::result::Result<(), std::fmt::Error> {
        let name = match self {
            Setting::HandlerFrameSize => "handler-frame-size",
            Setting::ExceptionStateSize => "exception-state-size",
        };

        fmt.write_str(name)
    }
}
