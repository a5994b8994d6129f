use std::io::{IsTerminal, Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anstream::{eprintln, stdout};
use clap::{Parser as ClapParser, Subcommand, ValueEnum};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

use yamlflow::{
    Compose, Composer, Document, DuplicateKeyPolicy, Emitter, EventData, FlowMode, ParseMode,
    Parser, ScalarStyle, Scanner, TokenData, Ypath,
};

/// A streaming YAML 1.1/1.2/1.3 and JSON processor.
#[derive(ClapParser)]
#[command(name = "yamlflow", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Language convention for parsing and resolution.
    #[arg(long, global = true, value_enum, default_value_t)]
    mode: ModeArg,

    /// Indentation width for emitted output.
    #[arg(long, global = true, default_value_t = 2)]
    indent: i32,

    /// Preferred line width for emitted output; negative for unlimited.
    #[arg(long, global = true, default_value_t = 80)]
    width: i32,

    /// Block/flow preference for emitted output.
    #[arg(long, global = true, value_enum, default_value_t)]
    flow: FlowArg,

    /// Print resolved tags even where they are implicit.
    #[arg(long, global = true)]
    resolve: bool,

    /// Colorize diagnostic output.
    #[arg(long, global = true, value_enum, default_value_t)]
    color: ColorArg,

    /// Only report errors.
    #[arg(long, global = true)]
    quiet: bool,

    /// Reject duplicate mapping keys and tabs in indentation.
    #[arg(long, global = true)]
    strict: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Parse input and print the event stream.
    Parse {
        /// Input file; stdin when omitted.
        file: Option<PathBuf>,
    },
    /// Scan input and print the token stream.
    Scan {
        file: Option<PathBuf>,
    },
    /// Re-emit the input event stream as YAML.
    Emit {
        file: Option<PathBuf>,
    },
    /// Load the input into a document tree and re-serialise it.
    Dump {
        file: Option<PathBuf>,
    },
    /// Stream the input through the composer, printing scalar paths.
    Compose {
        file: Option<PathBuf>,
    },
    /// Run a ypath expression against the input document.
    Path {
        /// The ypath expression, e.g. `/users/*/name`.
        expr: String,
        file: Option<PathBuf>,
    },
    /// Concatenate the documents of several inputs into one stream.
    Join {
        files: Vec<PathBuf>,
    },
}

#[derive(Copy, Clone, Default, PartialEq, Eq, ValueEnum)]
enum ModeArg {
    #[value(name = "yaml1.1")]
    Yaml11,
    #[default]
    #[value(name = "yaml1.2")]
    Yaml12,
    #[value(name = "yaml1.3")]
    Yaml13,
    Json,
}

impl From<ModeArg> for ParseMode {
    fn from(mode: ModeArg) -> ParseMode {
        match mode {
            ModeArg::Yaml11 => ParseMode::Yaml11,
            ModeArg::Yaml12 => ParseMode::Yaml12,
            ModeArg::Yaml13 => ParseMode::Yaml13,
            ModeArg::Json => ParseMode::Json,
        }
    }
}

#[derive(Copy, Clone, Default, PartialEq, Eq, ValueEnum)]
enum FlowArg {
    #[default]
    Any,
    Block,
    Flow,
    #[value(name = "flow-oneline")]
    FlowOneline,
}

impl From<FlowArg> for FlowMode {
    fn from(flow: FlowArg) -> FlowMode {
        match flow {
            FlowArg::Any => FlowMode::Any,
            FlowArg::Block => FlowMode::Block,
            FlowArg::Flow => FlowMode::Flow,
            FlowArg::FlowOneline => FlowMode::FlowOneline,
        }
    }
}

#[derive(Copy, Clone, Default, PartialEq, Eq, ValueEnum)]
enum ColorArg {
    #[default]
    Auto,
    On,
    Off,
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Parse(String),
}

impl From<yamlflow::ParserError> for CliError {
    fn from(err: yamlflow::ParserError) -> Self {
        CliError::Parse(err.to_string())
    }
}

impl From<yamlflow::ScannerError> for CliError {
    fn from(err: yamlflow::ScannerError) -> Self {
        CliError::Parse(err.to_string())
    }
}

impl From<yamlflow::ComposerError> for CliError {
    fn from(err: yamlflow::ComposerError) -> Self {
        CliError::Parse(err.to_string())
    }
}

impl From<yamlflow::YpathError> for CliError {
    fn from(err: yamlflow::YpathError) -> Self {
        CliError::Parse(err.to_string())
    }
}

impl From<yamlflow::EmitterError> for CliError {
    fn from(err: yamlflow::EmitterError) -> Self {
        match err {
            yamlflow::EmitterError::Writer(yamlflow::WriterError::Io(io)) => CliError::Io(io),
            other => CliError::Parse(other.to_string()),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.quiet { "error" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Io(err)) => {
            eprintln!("{}: {err}", "error".red().bold());
            ExitCode::from(3)
        }
        Err(CliError::Parse(problem)) => {
            eprintln!("{}: {problem}", "error".red().bold());
            ExitCode::from(1)
        }
    }
}

fn read_input(file: Option<&PathBuf>) -> Result<Vec<u8>, CliError> {
    match file {
        Some(path) => Ok(std::fs::read(path)?),
        None => {
            let mut data = Vec::new();
            std::io::stdin().read_to_end(&mut data)?;
            Ok(data)
        }
    }
}

fn color_enabled(choice: ColorArg) -> bool {
    match choice {
        ColorArg::On => true,
        ColorArg::Off => false,
        ColorArg::Auto => std::io::stdout().is_terminal(),
    }
}

fn configure_parser<'r>(cli: &Cli, input: &'r mut &[u8]) -> Parser<'r> {
    let mut parser = Parser::new();
    parser.set_mode(cli.mode.into());
    parser.set_lenient_tabs(!cli.strict);
    parser.set_input_string(input);
    parser
}

fn configure_emitter<'w>(cli: &Cli, out: &'w mut dyn Write) -> Emitter<'w> {
    let mut emitter = Emitter::new();
    emitter.set_output(out);
    emitter.set_indent(cli.indent);
    emitter.set_width(cli.width);
    emitter.set_flow(cli.flow.into());
    emitter
}

fn key_policy(cli: &Cli) -> DuplicateKeyPolicy {
    if cli.strict {
        DuplicateKeyPolicy::Error
    } else {
        DuplicateKeyPolicy::Warn
    }
}

fn run(cli: &Cli) -> Result<(), CliError> {
    match &cli.command {
        Command::Parse { file } => cmd_parse(cli, file.as_ref()),
        Command::Scan { file } => cmd_scan(cli, file.as_ref()),
        Command::Emit { file } => cmd_emit(cli, file.as_ref()),
        Command::Dump { file } => cmd_dump(cli, file.as_ref()),
        Command::Compose { file } => cmd_compose(cli, file.as_ref()),
        Command::Path { expr, file } => cmd_path(cli, expr, file.as_ref()),
        Command::Join { files } => cmd_join(cli, files),
    }
}

/// Escape a scalar value for the single-line event notation.
fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            '\x08' => out.push_str("\\b"),
            _ => out.push(ch),
        }
    }
    out
}

fn paint(kind: &str, colors: bool) -> String {
    if !colors {
        return String::from(kind);
    }
    let painted = if kind.starts_with('+') {
        format!("{}", kind.green())
    } else if kind.starts_with('-') {
        format!("{}", kind.red())
    } else {
        format!("{}", kind.yellow())
    };
    painted
}

fn cmd_parse(cli: &Cli, file: Option<&PathBuf>) -> Result<(), CliError> {
    let data = read_input(file)?;
    let mut input: &[u8] = &data;
    let mut parser = configure_parser(cli, &mut input);
    let colors = color_enabled(cli.color);
    let mut out = stdout().lock();

    loop {
        let event = parser.parse()?;
        let mut line = String::new();
        match &event.data {
            EventData::StreamStart { .. } => line.push_str(&paint("+STR", colors)),
            EventData::StreamEnd => line.push_str(&paint("-STR", colors)),
            EventData::DocumentStart { implicit, .. } => {
                line.push_str(&paint("+DOC", colors));
                if !implicit {
                    line.push_str(" ---");
                }
            }
            EventData::DocumentEnd { implicit } => {
                line.push_str(&paint("-DOC", colors));
                if !implicit {
                    line.push_str(" ...");
                }
            }
            EventData::SequenceStart { anchor, tag, implicit, .. } => {
                line.push_str(&paint("+SEQ", colors));
                push_properties(&mut line, anchor.as_deref(), tag.as_deref(), *implicit, cli);
            }
            EventData::SequenceEnd => line.push_str(&paint("-SEQ", colors)),
            EventData::MappingStart { anchor, tag, implicit, .. } => {
                line.push_str(&paint("+MAP", colors));
                push_properties(&mut line, anchor.as_deref(), tag.as_deref(), *implicit, cli);
            }
            EventData::MappingEnd => line.push_str(&paint("-MAP", colors)),
            EventData::Alias { anchor } => {
                line.push_str(&paint("=ALI", colors));
                line.push_str(" *");
                line.push_str(anchor);
            }
            EventData::Scalar {
                anchor,
                tag,
                value,
                plain_implicit,
                quoted_implicit,
                style,
            } => {
                line.push_str(&paint("=VAL", colors));
                let implicit = *plain_implicit || *quoted_implicit;
                push_properties(&mut line, anchor.as_deref(), tag.as_deref(), implicit, cli);
                line.push(' ');
                line.push(match style {
                    ScalarStyle::SingleQuoted => '\'',
                    ScalarStyle::DoubleQuoted => '"',
                    ScalarStyle::Literal => '|',
                    ScalarStyle::Folded => '>',
                    _ => ':',
                });
                line.push_str(&escape_value(value));
            }
        }
        writeln!(out, "{line}")?;
        if matches!(event.data, EventData::StreamEnd) {
            break;
        }
    }
    Ok(())
}

fn push_properties(line: &mut String, anchor: Option<&str>, tag: Option<&str>, implicit: bool, cli: &Cli) {
    if let Some(anchor) = anchor {
        line.push_str(" &");
        line.push_str(anchor);
    }
    if let Some(tag) = tag {
        if cli.resolve || !implicit {
            line.push_str(" <");
            line.push_str(tag);
            line.push('>');
        }
    }
}

fn cmd_scan(cli: &Cli, file: Option<&PathBuf>) -> Result<(), CliError> {
    let data = read_input(file)?;
    let mut input: &[u8] = &data;
    let mut scanner = Scanner::new();
    scanner.set_mode(cli.mode.into());
    scanner.set_lenient_tabs(!cli.strict);
    scanner.set_input_string(&mut input);
    let mut out = stdout().lock();

    loop {
        let token = scanner.scan()?;
        let mark = token.start_mark;
        let description = match &token.data {
            TokenData::StreamStart { encoding } => format!("STREAM-START {encoding:?}"),
            TokenData::StreamEnd => String::from("STREAM-END"),
            TokenData::VersionDirective { major, minor } => {
                format!("VERSION-DIRECTIVE {major}.{minor}")
            }
            TokenData::TagDirective { handle, prefix } => {
                format!("TAG-DIRECTIVE {handle} {prefix}")
            }
            TokenData::DocumentStart => String::from("DOCUMENT-START"),
            TokenData::DocumentEnd => String::from("DOCUMENT-END"),
            TokenData::BlockSequenceStart => String::from("BLOCK-SEQUENCE-START"),
            TokenData::BlockMappingStart => String::from("BLOCK-MAPPING-START"),
            TokenData::BlockEnd => String::from("BLOCK-END"),
            TokenData::FlowSequenceStart => String::from("FLOW-SEQUENCE-START"),
            TokenData::FlowSequenceEnd => String::from("FLOW-SEQUENCE-END"),
            TokenData::FlowMappingStart => String::from("FLOW-MAPPING-START"),
            TokenData::FlowMappingEnd => String::from("FLOW-MAPPING-END"),
            TokenData::BlockEntry => String::from("BLOCK-ENTRY"),
            TokenData::FlowEntry => String::from("FLOW-ENTRY"),
            TokenData::Key => String::from("KEY"),
            TokenData::Value => String::from("VALUE"),
            TokenData::Alias { value } => format!("ALIAS *{value}"),
            TokenData::Anchor { value } => format!("ANCHOR &{value}"),
            TokenData::Tag { handle, suffix } => format!("TAG {handle}{suffix}"),
            TokenData::Scalar { value, style } => {
                format!("SCALAR {style:?} {}", escape_value(value))
            }
        };
        writeln!(out, "{}:{}\t{description}", mark.line + 1, mark.column + 1)?;
        if matches!(token.data, TokenData::StreamEnd) {
            break;
        }
    }
    Ok(())
}

fn cmd_emit(cli: &Cli, file: Option<&PathBuf>) -> Result<(), CliError> {
    let data = read_input(file)?;
    let mut input: &[u8] = &data;
    let mut parser = configure_parser(cli, &mut input);
    let mut out = stdout().lock();
    let mut emitter = configure_emitter(cli, &mut out);

    loop {
        let event = parser.parse()?;
        let done = matches!(event.data, EventData::StreamEnd);
        emitter.emit(event)?;
        if done {
            break;
        }
    }
    Ok(())
}

fn cmd_dump(cli: &Cli, file: Option<&PathBuf>) -> Result<(), CliError> {
    let data = read_input(file)?;
    let mut input: &[u8] = &data;
    let mut parser = configure_parser(cli, &mut input);
    let policy = key_policy(cli);
    let mut docs = Vec::new();
    loop {
        let doc = Document::load_with(&mut parser, policy)?;
        if doc.root_id().is_none() {
            break;
        }
        docs.push(doc);
    }
    let mut out = stdout().lock();
    let mut emitter = configure_emitter(cli, &mut out);
    for doc in &docs {
        doc.dump(&mut emitter)?;
    }
    if !docs.is_empty() {
        emitter.close()?;
    }
    Ok(())
}

fn cmd_compose(cli: &Cli, file: Option<&PathBuf>) -> Result<(), CliError> {
    let data = read_input(file)?;
    let mut input: &[u8] = &data;
    let mut parser = configure_parser(cli, &mut input);
    let mut out = stdout().lock();
    let mut composer = Composer::new();
    let mut failure: Option<std::io::Error> = None;
    composer.compose(&mut parser, |event, path| {
        if let EventData::Scalar { value, .. } = &event.data {
            let on_key = path.last().is_some_and(yamlflow::PathComponent::in_key);
            if !on_key {
                if let Err(err) = writeln!(out, "{path}: {}", escape_value(value)) {
                    failure = Some(err);
                    return Ok(Compose::Stop);
                }
            }
        }
        Ok(Compose::Continue)
    })?;
    match failure {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn cmd_path(cli: &Cli, expr: &str, file: Option<&PathBuf>) -> Result<(), CliError> {
    let compiled = Ypath::compile(expr)?;
    let data = read_input(file)?;
    let mut input: &[u8] = &data;
    let mut parser = configure_parser(cli, &mut input);
    let doc = Document::load_with(&mut parser, key_policy(cli))?;
    let mut out = stdout().lock();
    for id in compiled.query(&doc)? {
        match doc.scalar_value(id) {
            Some(value) => writeln!(out, "{value}")?,
            None => {
                let fragment = doc.extract(id).expect("node id from query");
                write!(out, "{}", fragment.to_flow_string()?)?;
            }
        }
    }
    Ok(())
}

fn cmd_join(cli: &Cli, files: &[PathBuf]) -> Result<(), CliError> {
    let mut docs = Vec::new();
    let policy = key_policy(cli);
    for file in files {
        let data = read_input(Some(file))?;
        let mut input: &[u8] = &data;
        let mut parser = configure_parser(cli, &mut input);
        loop {
            let doc = Document::load_with(&mut parser, policy)?;
            if doc.root_id().is_none() {
                break;
            }
            docs.push(doc);
        }
    }
    let mut out = stdout().lock();
    let mut emitter = configure_emitter(cli, &mut out);
    for doc in &docs {
        doc.dump(&mut emitter)?;
    }
    if !docs.is_empty() {
        emitter.close()?;
    }
    Ok(())
}
