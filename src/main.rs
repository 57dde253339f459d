//! Trellis compiler CLI entry point.

mod cli;

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use cli::{Cli, Command, SourceArgs};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;
use trellis::args::parse_argument;
use trellis::diagnostics::print_diagnostic;
use trellis::{
    CompileReport, Compiler, CompilerConfig, Config, DirectorySource, DirectoryStore, Loader,
    MemoryStore, MergedContext, SourceProvider, SourceSet, UnitStore,
};

fn init_tracing(verbose: u8) {
    let fallback = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("TRELLIS_LOG").unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .ok();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match &cli.config {
        Some(path) => Config::load(path),
        None => Config::discover(Path::new(".")),
    };
    let config = match config {
        Ok(config) => config.compiler,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Command::Build {
            sources,
            force,
            out,
            templates,
        } => {
            let out = out.unwrap_or_else(|| config.out_dir.clone());
            let compiler = compiler(&config, &sources, Arc::new(DirectoryStore::new(out)));
            if let Err(e) = compiler.restore() {
                eprintln!("warning: previous build is unreadable: {e}");
            }
            let report = compile(&compiler, templates, force || config.force);
            summarize(&report);
            exit_code(&report)
        }
        Command::Check { sources, templates } => {
            let compiler = compiler(&config, &sources, Arc::new(MemoryStore::new()));
            let report = compile(&compiler, templates, true);
            summarize(&report);
            exit_code(&report)
        }
        Command::Run {
            sources,
            template,
            args,
        } => {
            let loader = Arc::new(Loader::new());
            let compiler = compiler(&config, &sources, Arc::new(MemoryStore::new()))
                .with_loader(Arc::clone(&loader));
            let report = compile(&compiler, Vec::new(), true);
            if report.failed.contains(&template) {
                summarize(&report);
                return ExitCode::FAILURE;
            }
            let args = args.iter().map(|arg| parse_argument(arg)).collect();
            match loader.invoke(&template, compiler.context(), args) {
                Ok(invocation) => {
                    print!("{}", invocation.output);
                    if !invocation.value.is_null() {
                        eprintln!("=> {}", invocation.value);
                    }
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("error: {e}");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Disasm { sources, template } => {
            let compiler = compiler(&config, &sources, Arc::new(MemoryStore::new()));
            let report = compile(&compiler, vec![template.clone()], true);
            match compiler.unit(&template) {
                Some(unit) => {
                    print!("{}", trellis_codegen::disassemble(&unit.name, &unit.payload));
                    ExitCode::SUCCESS
                }
                None => {
                    summarize(&report);
                    ExitCode::FAILURE
                }
            }
        }
    }
}

fn compiler(config: &CompilerConfig, args: &SourceArgs, store: Arc<dyn UnitStore>) -> Compiler {
    let dirs = if args.sources.is_empty() {
        &config.sources
    } else {
        &args.sources
    };
    let mut sources = SourceSet::new();
    for dir in dirs {
        sources.push(Arc::new(DirectorySource::new(dir)));
    }
    let namespace = args
        .namespace
        .clone()
        .unwrap_or_else(|| config.namespace.clone());
    Compiler::new(MergedContext::base_only(), sources, store).with_namespace(namespace)
}

/// Compile `templates` (everything when empty), printing diagnostics as they
/// arrive.
fn compile(compiler: &Compiler, templates: Vec<String>, force: bool) -> CompileReport {
    let names = if templates.is_empty() {
        compiler.template_names().into_iter().collect()
    } else {
        templates
    };
    let sources = compiler.sources().clone();
    compiler.compile_with(names, force, &mut |diag| {
        let text = sources.read(&diag.template).ok();
        print_diagnostic(diag, text.as_deref());
    })
}

fn summarize(report: &CompileReport) {
    eprintln!(
        "{} compiled, {} unchanged, {} failed ({} errors, {} warnings)",
        report.compiled.len(),
        report.skipped.len(),
        report.failed.len(),
        report.errors,
        report.warnings
    );
}

fn exit_code(report: &CompileReport) -> ExitCode {
    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
