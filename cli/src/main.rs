mod config;
mod test_runner;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use codespan_reporting::diagnostic::{Diagnostic, Label};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};

use project::{LoadReport, Loader, NoDecoder, OperationTable, Project, Target, TargetRef};

#[derive(Parser)]
#[command(name = "sprj", version, about = "Project document loader and checker")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    /// TOML file with extra [[operation]] entries for block resolution
    #[arg(long, global = true)]
    operations: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Load a project and report problems
    Check(FileArgs),

    /// Print the stage, sprites, scripts and definitions of a project
    Summary(FileArgs),

    /// Load and re-save a project, verifying the result is stable
    Roundtrip(RoundtripArgs),

    /// Run .test.xml test files
    Test(TestArgs),
}

#[derive(clap::Args)]
struct FileArgs {
    /// Project document to load
    file: String,
}

#[derive(clap::Args)]
struct RoundtripArgs {
    /// Project document to load
    file: String,

    /// Write the re-saved document here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(clap::Args)]
struct TestArgs {
    /// Path to a .test.xml file or directory containing them
    path: String,

    /// Run only tests in these categories (subfolder names). Repeatable.
    #[arg(short, long)]
    category: Vec<String>,

    /// List available categories and exit
    #[arg(long)]
    list_categories: bool,
}

/// Everything needed to load a file and report on it.
struct Session {
    files: SimpleFiles<String, String>,
    writer: StandardStream,
    config: term::Config,
    operations: OperationTable,
}

impl Session {
    fn new(no_color: bool, operations: OperationTable) -> Self {
        let color_choice = if no_color {
            ColorChoice::Never
        } else {
            ColorChoice::Auto
        };
        Session {
            files: SimpleFiles::new(),
            writer: StandardStream::stderr(color_choice),
            config: term::Config::default(),
            operations,
        }
    }

    fn emit(&self, diagnostic: &Diagnostic<usize>) {
        let _ = term::emit_to_write_style(&mut self.writer.lock(), &self.config, &self.files, diagnostic);
    }

    /// Load `path`, printing a diagnostic and exiting on failure and a
    /// warning for every placeholder.
    fn load(&mut self, path: &str) -> (Project, LoadReport) {
        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("error: cannot read '{}': {}", path, e);
                process::exit(1);
            }
        };
        let file_id = self.files.add(path.to_string(), source.clone());

        let mut decoder = NoDecoder;
        let result = Loader::new(&self.operations, &mut decoder)
            .with_file_id(file_id)
            .load(&source);
        match result {
            Ok((project, report)) => {
                for placeholder in &report.placeholders {
                    let diagnostic = Diagnostic::warning()
                        .with_message(format!(
                            "unknown block {:?} in {} was replaced by a placeholder",
                            placeholder.spec, placeholder.owner
                        ))
                        .with_labels(vec![Label::primary(file_id, placeholder.span.clone())]);
                    self.emit(&diagnostic);
                }
                for watcher in &report.dropped_watchers {
                    eprintln!("warning: dropped watcher {}", watcher);
                }
                (project, report)
            }
            Err(err) => {
                self.emit(&err.to_diagnostic(file_id));
                process::exit(1);
            }
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let operations = match config::operation_table(cli.operations.as_deref()) {
        Ok(table) => table,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    match cli.command {
        Command::Check(args) => {
            let mut session = Session::new(cli.no_color, operations);
            let (project, report) = session.load(&args.file);
            eprintln!(
                "ok: {} loaded ({} sprite(s), {} placeholder(s))",
                args.file,
                project.sprites().len(),
                report.placeholders.len()
            );
        }
        Command::Summary(args) => {
            let mut session = Session::new(cli.no_color, operations);
            let (project, _) = session.load(&args.file);
            print_summary(&project);
        }
        Command::Roundtrip(args) => {
            let mut session = Session::new(cli.no_color, operations);
            let (project, _) = session.load(&args.file);
            do_roundtrip(&project, &session.operations, args.output.as_deref());
        }
        Command::Test(test_args) => {
            let path = Path::new(&test_args.path);
            if test_args.list_categories {
                test_runner::list_categories(path);
                return;
            }
            let exit_code =
                test_runner::run_tests(path, cli.no_color, &test_args.category, &operations);
            process::exit(exit_code);
        }
    }
}

fn do_roundtrip(project: &Project, operations: &OperationTable, output: Option<&Path>) {
    let saved = project::save(project);

    let mut decoder = NoDecoder;
    let resaved = match Loader::new(operations, &mut decoder).load(&saved) {
        Ok((reloaded, _)) => project::save(&reloaded),
        Err(err) => {
            eprintln!("error: re-saved document does not load: {}", err);
            process::exit(1);
        }
    };
    if resaved != saved {
        eprintln!("error: saving is not stable across a reload");
        process::exit(1);
    }

    match output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, &saved) {
                eprintln!("error: cannot write '{}': {}", path.display(), e);
                process::exit(1);
            }
            eprintln!("ok: wrote {} bytes to {}", saved.len(), path.display());
        }
        None => println!("{}", saved),
    }
}

fn print_summary(project: &Project) {
    println!("project {:?}", project.name);
    if !project.notes.is_empty() {
        println!("  notes: {} line(s)", project.notes.lines().count());
    }
    for definition in &project.global_blocks {
        let definition = definition.borrow();
        println!("  global {} {:?} ({})", definition.kind, definition.spec, definition.category);
    }
    print_target(&project.stage);
    for sprite in project.sprites() {
        print_target(&sprite);
    }
    let globals = project.globals.borrow();
    if !globals.vars.is_empty() {
        println!("  globals: {}", globals.names().collect::<Vec<_>>().join(", "));
    }
}

fn print_target(target: &TargetRef) {
    let target = target.borrow();
    println!("  {}", describe(&target));
    for definition in &target.blocks {
        let definition = definition.borrow();
        println!("    define {} {:?} ({})", definition.kind, definition.spec, definition.category);
    }
    let variables = target.variables.borrow();
    if !variables.vars.is_empty() {
        println!("    variables: {}", variables.names().collect::<Vec<_>>().join(", "));
    }
    for (i, script) in target.scripts.iter().enumerate() {
        let blocks = script.walk();
        let placeholders = blocks.iter().filter(|b| b.is_placeholder()).count();
        print!("    script {}: {} block(s)", i + 1, blocks.len());
        if placeholders > 0 {
            print!(", {} placeholder(s)", placeholders);
        }
        println!();
    }
    if let Some(stage) = target.as_stage() {
        if !stage.watchers.is_empty() {
            println!("    watchers: {}", stage.watchers.len());
        }
    }
}

fn describe(target: &Target) -> String {
    let costumes = target.costumes.borrow().len();
    match target.as_sprite() {
        Some(sprite) => format!(
            "sprite {:?} at ({}, {}) heading {}, {} costume(s)",
            target.name, sprite.x, sprite.y, sprite.heading, costumes
        ),
        None => format!("stage {:?}, {} costume(s)", target.name, costumes),
    }
}
