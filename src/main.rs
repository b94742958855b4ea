// cheader: list the declarations, tags and typedefs found in a C header

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use log::info;

use cheader::diagnostics::Severity;
use cheader::parser::{MacroDefinition, MacroTable};
use cheader::{parse_header_with, HeaderModel};

/// cheader - parse a C header and print its declarations
#[derive(Parser, Debug)]
#[command(author, version, about, long_about)]
struct Args {
    /// Define NAME as a macro before parsing. VALUE defaults to 1.
    #[arg(short = 'D', value_name = "NAME[=VALUE]")]
    define: Vec<String>,

    /// Report errors only.
    #[arg(long)]
    no_warnings: bool,

    /// Also list every cyclic typedef chain.
    #[arg(long)]
    cycles: bool,

    /// The header file to parse.
    file: PathBuf,
}

/// Macro table seeded from `-D` options
fn predefined(defines: &[String]) -> MacroTable {
    let mut table = MacroTable::new();
    for define in defines {
        let (name, value) = define.split_once('=').unwrap_or((define.as_str(), "1"));
        table.define(MacroDefinition::object(name, value));
    }
    table
}

fn print_model(model: &HeaderModel, cycles: bool) {
    println!("declarations:");
    for declaration in &model.declarations {
        let body = if declaration.is_definition { " { ... }" } else { "" };
        println!("  {declaration}{body}");
    }

    println!("tags:");
    for (_, entry) in model.table.tags() {
        println!("  {}", entry.definition);
    }

    println!("typedefs:");
    for (name, entry) in model.table.typedefs() {
        println!("  typedef {}", entry.definition.declarator(name));
    }

    if cycles {
        println!("cycles:");
        for cycle in model.table.detect_cycles() {
            let mut chain = cycle.clone();
            chain.extend(cycle.first().cloned());
            println!("  {}", chain.join(" -> "));
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    let source = match fs::read_to_string(&args.file) {
        Ok(source) => source,
        Err(e) => {
            eprintln!("Error: cannot read '{}': {}", args.file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    info!("parsing {}", args.file.display());
    let model = parse_header_with(&source, predefined(&args.define));
    print_model(&model, args.cycles);

    for diagnostic in &model.diagnostics {
        if args.no_warnings && diagnostic.severity == Severity::Warning {
            continue;
        }
        eprintln!("{}: {}", args.file.display(), diagnostic);
    }

    // Diagnostics never change the exit status
    ExitCode::SUCCESS
}
