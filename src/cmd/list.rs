use crate::vm::byte_code::registry::Registry;
use crate::vm::byte_code::stack_effect::StackEffect;
use clap::arg;
use std::io::{self, Write};

pub struct Command {
    kind: Option<String>,
}

impl Command {
    pub fn new(opts: &clap::ArgMatches) -> Self {
        Self {
            kind: opts.value_of("kind").map(String::from),
        }
    }

    pub fn options<'a>() -> clap::Command<'a> {
        clap::Command::new("list")
            .alias("l")
            .about("list all opcodes with their operand kinds and stack effects")
            .arg(arg!(--kind <KIND> "only list opcodes of this operand kind").required(false))
    }

    pub fn run(&self, registry: &Registry) -> anyhow::Result<()> {
        let stdout = io::stdout();
        let mut out = stdout.lock();

        for (setting, value) in registry.settings().as_vec() {
            writeln!(out, "# {} = {}", setting, value)?;
        }
        writeln!(out, "{:>4}  {:<28} {:<10} {}", "code", "name", "kinds", "effect")?;

        for op in registry.iter() {
            let kinds = op.kinds.to_string();

            if let Some(kind) = &self.kind {
                if !op.kinds.iter().any(|k| k.to_string() == *kind) {
                    continue;
                }
            }

            let effect = match registry.stack_effect_entry(op.name) {
                Ok(StackEffect::Constant(effect)) => effect.to_string(),
                Ok(StackEffect::Computed(_)) => String::from("computed"),
                Err(_) => String::from("-"),
            };

            writeln!(out, "{:>4}  {:<28} {:<10} {}", op.code, op.name, kinds, effect)?;
        }

        if self.kind.is_none() {
            for carrier in registry.carriers() {
                writeln!(out, "\n{} sub-operations:", carrier.carrier().name)?;
                for sub_op in carrier.iter() {
                    writeln!(out, "{:>4}  {}", sub_op.selector, sub_op.name)?;
                }
            }
        }

        Ok(())
    }
}
