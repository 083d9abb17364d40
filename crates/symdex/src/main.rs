use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use regex::Regex;
use symdex_core::index::NameQuery;
use symdex_core::types::{Address, SymbolContext};
use symdex_core::{SymbolError, SymbolFile, SymbolFileOptions};
use symdex_utils::{info, init_logging};

/// Query DWARF debug information: functions, globals, types, and source lines.
#[derive(Parser, Debug)]
#[command(name = "symdex")]
#[command(version)]
#[command(about = "Query DWARF debug information: functions, globals, types, and source lines", long_about = None)]
struct Cli
{
    /// Binary (or companion file) to read
    binary: PathBuf,

    /// Directory searched for `.dwo` companion files (repeatable)
    #[arg(long = "search-path", global = true)]
    search_paths: Vec<PathBuf>,

    /// Split DWARF package to use instead of `<binary>.dwp`
    #[arg(long, global = true)]
    dwp: Option<PathBuf>,

    /// Directory searched for external modules (repeatable)
    #[arg(long = "module-path", global = true)]
    module_paths: Vec<PathBuf>,

    /// Ignore `.debug_pubnames` / `.debug_pubtypes` and always scan
    #[arg(long, default_value_t = false, global = true)]
    no_accelerator: bool,

    /// Print recorded non-fatal problems after the command
    #[arg(long, default_value_t = false, global = true)]
    diagnostics: bool,

    #[command(subcommand)]
    command: Commands,
}

/// A name or, with `--regex`, a pattern.
#[derive(Args, Debug)]
struct NameArgs
{
    /// Name to look up
    name: String,
    /// Treat the name as a regular expression
    #[arg(short, long, default_value_t = false)]
    regex: bool,
    /// Stop after this many results
    #[arg(short, long)]
    max: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Commands
{
    /// List compile units
    Units,
    /// Find functions by name
    Functions
    {
        #[command(flatten)]
        name: NameArgs,
        /// Include inlined calls
        #[arg(long, default_value_t = false)]
        inlines: bool,
    },
    /// Find global and static variables by name
    Globals
    {
        #[command(flatten)]
        name: NameArgs,
    },
    /// Find types by name
    Types
    {
        #[command(flatten)]
        name: NameArgs,
    },
    /// Find a namespace by name
    Namespace
    {
        /// Namespace name (base or `::`-qualified)
        name: String,
    },
    /// Describe the code at an address (hex format: 0x1000 or decimal)
    Lookup
    {
        address: String,
    },
    /// Find the code for a source line
    Line
    {
        /// Source file (full path or trailing components)
        file: String,
        /// Line number
        line: u32,
        /// Also search units that only inline code from the file
        #[arg(long, default_value_t = false)]
        inlines: bool,
    },
    /// List external modules referenced by the binary
    Modules,
}

fn main()
{
    // Initialize logging (reads from RUST_LOG env var)
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        process::exit(1);
    }

    let cli = Cli::parse();
    if let Err(e) = run_command(cli) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn options(cli: &Cli) -> SymbolFileOptions
{
    let mut options = SymbolFileOptions::from_env();
    for path in &cli.search_paths {
        options = options.with_debug_file_search_path(path.clone());
    }
    for path in &cli.module_paths {
        options = options.with_module_search_path(path.clone());
    }
    if let Some(dwp) = &cli.dwp {
        options = options.with_dwp_path(dwp.clone());
    }
    if cli.no_accelerator {
        options = options.with_accelerator_tables(false);
    }
    options
}

fn run_command(cli: Cli) -> Result<(), SymbolError>
{
    let file = SymbolFile::open(&cli.binary, options(&cli))?;
    info!("Reading {}", cli.binary.display());

    match &cli.command {
        Commands::Units => print_units(&file)?,
        Commands::Functions { name, inlines } => {
            let regex = compile(name)?;
            let query = query(name, regex.as_ref());
            for function in file.find_functions(&query, *inlines, name.max)? {
                let address = function
                    .entry_address()
                    .map_or_else(|| "-".to_string(), |address| address.to_string());
                println!("{}  {}  {}", function.uid(), address, function.display_name());
            }
        }
        Commands::Globals { name } => {
            let regex = compile(name)?;
            let query = query(name, regex.as_ref());
            for variable in file.find_globals(&query, name.max)? {
                println!(
                    "{}  {:?}  {}",
                    variable.uid(),
                    variable.scope(),
                    variable
                        .qualified_name()
                        .or(variable.name())
                        .unwrap_or("<anonymous>")
                );
            }
        }
        Commands::Types { name } => {
            let regex = compile(name)?;
            let query = query(name, regex.as_ref());
            for found in file.find_types(&query, name.max)? {
                println!("{}  {}", found.uid(), found);
            }
        }
        Commands::Namespace { name } => match file.find_namespace(name, None)? {
            Some(context) => println!("{}  {}", context.uid, context.qualified_name),
            None => println!("No namespace named {}", name),
        },
        Commands::Lookup { address } => {
            let address = parse_address(address)?;
            print_context(&file.resolve_address(address)?);
        }
        Commands::Line { file: path, line, inlines } => {
            let contexts = file.resolve_file_line(path, *line, *inlines)?;
            if contexts.is_empty() {
                println!("No code for {}:{}", path, line);
            }
            for context in &contexts {
                print_context(context);
            }
        }
        Commands::Modules => {
            for (name, module) in file.external_type_modules() {
                match module {
                    Some(module) => println!("{}  {}", name, module.path.display()),
                    None => println!("{}  <not found>", name),
                }
            }
        }
    }

    if cli.diagnostics {
        for diagnostic in file.diagnostics().snapshot() {
            eprintln!("{}", diagnostic);
        }
    }
    Ok(())
}

fn compile(name: &NameArgs) -> Result<Option<Regex>, SymbolError>
{
    if name.regex {
        Ok(Some(Regex::new(&name.name)?))
    } else {
        Ok(None)
    }
}

fn query<'a>(name: &'a NameArgs, regex: Option<&'a Regex>) -> NameQuery<'a>
{
    match regex {
        Some(regex) => NameQuery::Regex(regex),
        None => NameQuery::Exact(&name.name),
    }
}

fn parse_address(text: &str) -> Result<Address, SymbolError>
{
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse::<u64>(),
    };
    parsed
        .map(Address::new)
        .map_err(|_| SymbolError::Object(format!("invalid address: {}", text)))
}

fn print_units(file: &SymbolFile) -> Result<(), SymbolError>
{
    for index in 0..file.num_compile_units() {
        let unit = file.compile_unit(index)?;
        let name = unit
            .info()
            .ok()
            .and_then(|info| info.name.clone())
            .unwrap_or_else(|| "<unnamed>".to_string());
        let language = file
            .parse_language(index)?
            .map_or_else(|| "unknown".to_string(), |language| language.to_string());
        println!(
            "{:4}  v{}  {:?}  {}  {}",
            index,
            unit.version(),
            unit.role(),
            language,
            name
        );
    }
    Ok(())
}

fn print_context(context: &SymbolContext)
{
    let Some(unit) = context.unit else {
        println!("No compile unit covers this address");
        return;
    };
    println!("Unit: {}", unit);
    if let Some(function) = &context.function {
        println!("  Function: {}", function.display_name());
    }
    if let Some(block) = context.block {
        println!("  Block: {}", block);
    }
    if let Some(line) = &context.line {
        println!("  Location: {}:{}:{} at {}", line.file, line.line, line.column, line.address);
    }
}
