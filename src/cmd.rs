pub mod disassemble;
pub mod effect;
pub mod list;

use crate::vm::byte_code::opcodes;
use crate::vm::byte_code::registry::Registry;
use crate::vm::settings::{Setting, Settings};
use anyhow::Context;
use clap::arg;

/// Options shared by all sub commands
pub fn global_options<'a>() -> Vec<clap::Arg<'a>> {
    vec![
        arg!(--"handler-frame-size" <SIZE> "stack slots pushed when entering an exception handler")
            .required(false)
            .global(true),
    ]
}

pub fn settings(opts: &clap::ArgMatches) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    if let Some(size) = opts.value_of("handler-frame-size") {
        let size = size
            .parse::<i32>()
            .with_context(|| format!("invalid handler frame size: {}", size))?;
        anyhow::ensure!(size >= 1, "handler frame size must be at least 1, got {}", size);
        settings.set(Setting::HandlerFrameSize, size);
    }

    Ok(settings)
}

pub fn registry(opts: &clap::ArgMatches) -> anyhow::Result<Registry> {
    let settings = settings(opts)?;
    log::debug!("building opcode table with {:?}", settings.as_vec());
    Ok(opcodes::standard(settings)?)
}
