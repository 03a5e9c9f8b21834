use crate::vm::byte_code::registry::Registry;
use crate::vm::byte_code::stack_effect::Branch;
use crate::vm::byte_code::Oparg;
use anyhow::Context;
use clap::arg;

pub struct Command {
    name: String,
    arg: Oparg,
    branch: Branch,
}

impl Command {
    pub fn new(opts: &clap::ArgMatches) -> anyhow::Result<Self> {
        let name = opts.value_of("NAME").unwrap_or_default().to_uppercase();
        let arg = match opts.value_of("ARG") {
            Some(arg) => arg
                .parse::<Oparg>()
                .with_context(|| format!("invalid argument: {}", arg))?,
            None => 0,
        };
        let branch = if opts.is_present("taken") {
            Branch::Taken
        } else if opts.is_present("not-taken") {
            Branch::NotTaken
        } else {
            Branch::NotApplicable
        };

        Ok(Self { name, arg, branch })
    }

    pub fn options<'a>() -> clap::Command<'a> {
        clap::Command::new("effect")
            .alias("e")
            .about("compute the stack effect of an instruction")
            .arg(arg!(<NAME> "the opcode name"))
            .arg(arg!([ARG] "the decoded argument"))
            .arg(arg!(--taken "the branch is taken").conflicts_with("not-taken"))
            .arg(arg!(--"not-taken" "the branch falls through"))
    }

    pub fn run(&self, registry: &Registry) -> anyhow::Result<()> {
        let effect = registry.stack_effect(&self.name, self.arg, self.branch)?;
        println!("{}({}) = {:+}", self.name, self.arg, effect);

        if self.branch == Branch::NotApplicable {
            let max = registry.max_stack_effect(&self.name, self.arg)?;
            if max != effect {
                println!("max over both branches = {:+}", max);
            }
        }

        Ok(())
    }
}
