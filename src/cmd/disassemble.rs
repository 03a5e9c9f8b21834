use crate::compiler::stack_depth;
use crate::vm::byte_code::chunk::Chunk;
use crate::vm::byte_code::registry::Registry;
use crate::vm::disassembler::disassemble;
use anyhow::Context;
use clap::arg;
use std::io;

pub struct Command {
    code: Vec<u8>,
}

impl Command {
    pub fn new(opts: &clap::ArgMatches) -> anyhow::Result<Self> {
        let input = opts.value_of("HEX").unwrap_or_default();
        let cleaned: String = input.chars().filter(|c| !c.is_whitespace()).collect();
        let code = hex::decode(&cleaned).with_context(|| format!("invalid byte code: {}", input))?;

        Ok(Self { code })
    }

    pub fn options<'a>() -> clap::Command<'a> {
        clap::Command::new("dis")
            .alias("d")
            .about("disassemble hex encoded byte code and compute its stack depth")
            .arg(arg!(<HEX> "the byte code, two hex digits per byte"))
    }

    pub fn run(&self, registry: &Registry) -> anyhow::Result<()> {
        let chunk = Chunk::from_bytes(self.code.clone());

        disassemble(&mut io::stdout(), registry, &chunk, "input")?;
        let depth = stack_depth::max_stack_depth(registry, &chunk)?;
        println!("max stack depth: {}", depth);

        Ok(())
    }
}
