use opcodes::cmd;

fn main() {
    pretty_env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let matches = clap::Command::new("opcodes")
        .version("0.1")
        .about("Inspect the opcode table and analyse byte code")
        .args(cmd::global_options())
        .subcommand_required(true)
        .subcommand(cmd::list::Command::options())
        .subcommand(cmd::effect::Command::options())
        .subcommand(cmd::disassemble::Command::options())
        .get_matches();

    match matches.subcommand() {
        Some(("list", opts)) => cmd::list::Command::new(opts).run(&cmd::registry(opts)?),
        Some(("effect", opts)) => cmd::effect::Command::new(opts)?.run(&cmd::registry(opts)?),
        Some(("dis", opts)) => cmd::disassemble::Command::new(opts)?.run(&cmd::registry(opts)?),
        _ => unreachable!("clap requires a subcommand"),
    }
}
