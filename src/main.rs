use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::process::exit;

use clap::{Parser, Subcommand};

use stddef_cc::header::{HeaderOptions, OffsetofStyle, DEFAULT_NAMESPACE};
use stddef_cc::machine::{self, Machine};
use stddef_cc::preprocess::predefines;
use stddef_cc::type_registry::Symbol;
use stddef_cc::{ErrorCollector, Session};

#[derive(Parser)]
#[command(name = "stddef-cc", about = "Freestanding <stddef.h> for C targets")]
struct Cli {
    /// Target preset
    #[arg(long, global = true, default_value = machine::DEFAULT_PRESET)]
    target: String,

    /// Target description in JSON, takes precedence over --target
    #[arg(long, global = true)]
    machine: Option<PathBuf>,

    /// Print output from intermediate stages
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct HeaderArgs {
    /// offsetof expands to __builtin_offsetof
    #[arg(long)]
    builtin_offsetof: bool,

    /// Namespace of the inclusion guard
    #[arg(long, default_value = DEFAULT_NAMESPACE)]
    namespace: String,
}

#[derive(Subcommand)]
enum Command {
    /// Print the <stddef.h> of the target
    Header {
        /// Output file name
        #[arg(short)]
        output: Option<PathBuf>,

        #[command(flatten)]
        header: HeaderArgs,
    },
    /// Print the predefined macros of the target
    Predefines,
    /// Preprocess and translate a file
    Check {
        /// Input file name
        input: PathBuf,

        /// Add directory to the include search path
        #[arg(short = 'I')]
        include: Vec<PathBuf>,

        /// Define macro
        #[arg(short = 'D')]
        define: Vec<String>,

        /// Show include statistics
        #[arg(long)]
        stats: bool,

        #[command(flatten)]
        header: HeaderArgs,
    },
    /// List the target presets
    Targets,
}

impl HeaderArgs {
    fn options(&self) -> HeaderOptions {
        HeaderOptions {
            namespace: self.namespace.clone(),
            offsetof_style: if self.builtin_offsetof {
                OffsetofStyle::Builtin
            } else {
                OffsetofStyle::NullPointer
            },
        }
    }
}

fn load_machine(cli: &Cli) -> Machine {
    let r = match &cli.machine {
        Some(path) => Machine::from_file(path),
        None => Machine::preset(&cli.target),
    };
    match r {
        Ok(m) => m,
        Err(e) => {
            println!("error: {}", e);
            exit(1);
        }
    }
}

fn main() {
    let cli = Cli::parse();

    match &cli.command {
        Command::Targets => {
            for name in machine::PRESET_NAMES {
                // presets are checked at compile time
                if let Ok(m) = Machine::preset(name) {
                    let p = m.primitives();
                    println!(
                        "{}: pointer {} bytes, size_t = {}, ptrdiff_t = {}, wchar_t = {}",
                        name,
                        m.model().ptr_size,
                        p.size,
                        p.ptrdiff,
                        p.wchar
                    );
                }
            }
        }
        Command::Predefines => {
            let m = load_machine(&cli);
            for (name, value) in predefines(&m) {
                println!("#define {} {}", name, value);
            }
        }
        Command::Header { output, header } => {
            let m = load_machine(&cli);
            if cli.verbose {
                println!("target {}: {:?}", m.name(), m.model());
            }
            let text = Session::with_options(m, header.options()).header();
            match output {
                Some(path) => {
                    if let Err(e) = File::create(path).and_then(|mut f| write!(f, "{}", text)) {
                        println!("Cannot open {} for writing: {}", path.display(), e);
                        exit(1);
                    }
                }
                None => print!("{}", text),
            }
        }
        Command::Check {
            input,
            include,
            define,
            stats,
            header,
        } => {
            let m = load_machine(&cli);
            let mut session = Session::with_options(m, header.options());
            for dir in include {
                session.add_search_dir(dir);
            }
            for d in define {
                session.define(d);
            }
            let name = input.display().to_string();

            if cli.verbose {
                println!("========== PREPROCESS ===========");
            }
            let pp = match session.preprocess(&name) {
                Ok(pp) => pp,
                Err(e) => {
                    println!("{}:{}: error: {}", e.file, e.line, e.kind);
                    exit(1);
                }
            };
            if cli.verbose {
                println!("{}", pp.text);
            }
            for w in pp.warnings.iter() {
                println!("{}", w);
            }
            if *stats {
                print!("{}", pp.stats);
            }

            if cli.verbose {
                println!("========== TRANSLATE ===========");
            }
            let mut ec = ErrorCollector::new();
            let tu = session.translate(&pp.text, &mut ec);
            for issue in ec.format_issues(&name, &pp.text) {
                println!("{}", issue);
            }
            let tu = match tu {
                Ok(tu) => tu,
                Err(()) => exit(1),
            };
            if cli.verbose {
                println!("========== BINDINGS ===========");
                for (name, t) in tu.bindings() {
                    println!("typedef {} {}", t, name);
                }
                let mut objects: Vec<_> = tu
                    .registry()
                    .symbols()
                    .filter_map(|(name, sym)| match sym {
                        Symbol::Object(obj) => Some((name, obj)),
                        Symbol::Type(_) => None,
                    })
                    .collect();
                objects.sort_by(|a, b| a.0.cmp(b.0));
                for (name, obj) in objects {
                    match &obj.initializer {
                        Some(init) => println!("{} {} = {}", obj.t, name, init),
                        None => println!("{} {}", obj.t, name),
                    }
                }
            }
        }
    }
}
