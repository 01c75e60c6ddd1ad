use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::{bail, eyre, WrapErr};

use peephole_rs::infer;
use peephole_rs::matcher::{Matcher, MatcherConfig};
use peephole_rs::program::{Instruction, Program};
use peephole_rs::rules;

const SAMPLE: &str = "
    builtin +
    push 20
    push 22
    call 2
    push 1
    add
    load %0
    pop
    builtin print
    load %1
    call 1
    ret
";

#[derive(Debug, Parser)]
#[command(author, version)]
struct Cli {
    /// Program listing, one instruction per line (`;` also separates).
    #[arg(value_name = "FILE")]
    input: Option<PathBuf>,

    /// Builtins whose calls become `call.known`.
    #[clap(long, value_name = "NAME")]
    devirtualize: Vec<String>,

    /// Keep the facts computed before the scan instead of recomputing them after every rewrite.
    #[clap(long)]
    static_facts: bool,

    /// Stop after this many rewrites.
    #[clap(long, value_name = "INT")]
    max_rewrites: Option<usize>,

    /// Log level.
    #[clap(long, default_value = "info")]
    log: simplelog::LevelFilter,
}

fn parse_instruction(program: &mut Program, line: &str) -> color_eyre::Result<Instruction> {
    let mut words = line.split_whitespace();
    let opcode = words.next().ok_or_else(|| eyre!("empty instruction"))?;
    let mut operand = |what: &str| {
        words
            .next()
            .ok_or_else(|| eyre!("'{}' needs {}", opcode, what))
    };

    let instruction = match opcode {
        "push" => {
            let value: i32 = operand("a literal")?.parse()?;
            let index = program.pool_mut().append(value);
            Instruction::Push { index }
        }
        "load" => {
            let slot = operand("a slot")?;
            let slot = slot.strip_prefix('%').unwrap_or(slot).parse()?;
            Instruction::Load { slot }
        }
        "builtin" => {
            let name = operand("a name")?;
            Instruction::Builtin {
                symbol: program.symbol(name),
            }
        }
        "call" => Instruction::Call {
            nargs: operand("an argument count")?.parse()?,
        },
        "call.known" => {
            let name = operand("a name")?.to_string();
            let nargs = operand("an argument count")?.parse()?;
            Instruction::CallKnown {
                symbol: program.symbol(&name),
                nargs,
            }
        }
        "add" => Instruction::Add,
        "iadd" => Instruction::IAdd,
        "pop" => Instruction::Pop,
        "ret" => Instruction::Ret,
        other => bail!("unknown opcode '{}'", other),
    };
    Ok(instruction)
}

fn parse_program(text: &str) -> color_eyre::Result<Program> {
    let mut program = Program::new();
    for (n, line) in text.lines().enumerate() {
        let line = line.split('#').next().unwrap_or_default();
        for part in line.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            let instruction = parse_instruction(&mut program, part).wrap_err_with(|| format!("line {}", n + 1))?;
            program.append(instruction);
        }
    }
    Ok(program)
}

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let args = Cli::parse();

    simplelog::TermLogger::init(
        args.log,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    )?;

    let time_total = std::time::Instant::now();

    println!("args = {:?}", args);

    let text = match &args.input {
        Some(path) => std::fs::read_to_string(path).wrap_err_with(|| format!("reading {}", path.display()))?,
        None => SAMPLE.to_string(),
    };
    let mut program = parse_program(&text)?;
    println!("Input ({} instructions, {} bytes):", program.len(), program.end_pc().offset());
    print!("{}", program);

    let mut matcher = Matcher::new(MatcherConfig {
        max_rewrites: args.max_rewrites,
    });
    for rule in rules::standard() {
        matcher.add_rule(rule);
    }
    for target in &args.devirtualize {
        matcher.add_rule(rules::devirtualize(target));
    }
    println!("matcher = {:?}", matcher);

    let report = if args.static_facts {
        let analyses = infer::all(&program);
        matcher.scan(&mut program, &analyses)
    } else {
        matcher.scan_with(&mut program, infer::all)
    };

    for firing in &report.firings {
        println!(
            "- {} at {}: {:?}",
            matcher.rule(firing.rule).name(),
            firing.location,
            firing.outcome
        );
    }
    println!("stats = {:?}", report.stats);
    if report.truncated {
        println!("Scan stopped early after {} rewrites", report.rewrites());
    }

    println!("Output ({} instructions, {} bytes):", program.len(), program.end_pc().offset());
    print!("{}", program);

    let time_total = time_total.elapsed();
    println!("Done in {:.3} s", time_total.as_secs_f64());

    Ok(())
}
