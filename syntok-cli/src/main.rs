//! Command-line driver for `syntok`: reads a rule file and an input file,
//! compiles the rules into a DFA, tokenizes the input, and prints the
//! resulting tokens one per line. With `--edits`, replays a scripted
//! sequence of edits against the tokenized text and re-tokenizes
//! incrementally after each one, to eyeball the incremental-equivalence
//! property (§8) before trusting the test suite.

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use syntok::dfa::ByteReader;
use syntok::error::IoError;
use syntok::rules::{CompiledRuleSet, CompileOptions, Rule};
use syntok::token::{Edit, RoleTag};
use syntok::tokenizer::ReaderAt;
use syntok::tree::TokenTree;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("could not read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("rule file line {line}: expected \"<role> <pattern>\", got {text:?}")]
    MalformedRuleLine { line: usize, text: String },
    #[error("rule file line {line}: unknown role {role:?}")]
    UnknownRole { line: usize, role: String },
    #[error("edit script line {line}: expected \"<pos> <num_deleted> <inserted text>\", got {text:?}")]
    MalformedEditLine { line: usize, text: String },
    #[error("edit script line {line}: {field} {value:?} is not a valid number")]
    MalformedEditNumber { line: usize, field: &'static str, value: String },
    #[error("failed to compile rules: {0}")]
    Compile(#[from] syntok::error::CompileError),
    #[error("failed to tokenize input: {0}")]
    Tokenize(#[from] IoError),
}

/// Tokenize a file against a rule file, optionally replaying a scripted
/// sequence of edits afterward.
#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    /// Rule file: one `<role> <pattern>` per line, `#` starts a comment.
    rules: PathBuf,
    /// File to tokenize.
    input: PathBuf,
    /// Maximum number of DFA states the rule set may compile to.
    #[arg(long, default_value_t = CompileOptions::default().max_dfa_states)]
    max_dfa_states: usize,
    /// Edit script to replay after the initial tokenization: one
    /// `<pos> <num_deleted> <inserted text>` per line, `#` starts a comment.
    /// Each line is applied to the in-memory text and re-tokenized
    /// incrementally, with the resulting token table printed after it.
    #[arg(long)]
    edits: Option<PathBuf>,
}

/// One line of a scripted edit: replace `num_deleted` bytes starting at
/// `pos` with `inserted`.
struct ScriptedEdit {
    pos: u64,
    num_deleted: u64,
    inserted: Vec<u8>,
}

fn load_edits(path: &PathBuf) -> Result<Vec<ScriptedEdit>, CliError> {
    let contents = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.clone(),
        source,
    })?;
    let mut edits = Vec::new();
    for (i, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim_end();
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        let mut parts = line.splitn(3, ' ');
        let (pos_text, num_deleted_text) = match (parts.next(), parts.next()) {
            (Some(p), Some(n)) => (p, n),
            _ => {
                return Err(CliError::MalformedEditLine {
                    line: i + 1,
                    text: raw_line.to_string(),
                })
            }
        };
        let inserted_text = parts.next().unwrap_or("");
        let pos = pos_text.parse::<u64>().map_err(|_| CliError::MalformedEditNumber {
            line: i + 1,
            field: "pos",
            value: pos_text.to_string(),
        })?;
        let num_deleted = num_deleted_text.parse::<u64>().map_err(|_| CliError::MalformedEditNumber {
            line: i + 1,
            field: "num_deleted",
            value: num_deleted_text.to_string(),
        })?;
        edits.push(ScriptedEdit {
            pos,
            num_deleted,
            inserted: inserted_text.as_bytes().to_vec(),
        });
    }
    Ok(edits)
}

fn parse_role(line: usize, text: &str) -> Result<RoleTag, CliError> {
    match text {
        "Operator" => Ok(RoleTag::Operator),
        "Keyword" => Ok(RoleTag::Keyword),
        "Identifier" => Ok(RoleTag::Identifier),
        "Number" => Ok(RoleTag::Number),
        "String" => Ok(RoleTag::String),
        "Comment" => Ok(RoleTag::Comment),
        other => Err(CliError::UnknownRole {
            line,
            role: other.to_string(),
        }),
    }
}

fn load_rules(path: &PathBuf) -> Result<Vec<Rule>, CliError> {
    let contents = fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.clone(),
        source,
    })?;
    let mut rules = Vec::new();
    for (i, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (role_text, pattern) = line.split_once(char::is_whitespace).ok_or_else(|| CliError::MalformedRuleLine {
            line: i + 1,
            text: raw_line.to_string(),
        })?;
        let role = parse_role(i + 1, role_text)?;
        rules.push(Rule::new(pattern.trim(), role));
    }
    Ok(rules)
}

struct SliceReaderAt {
    bytes: Vec<u8>,
}

struct SliceReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader for SliceReader<'a> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, IoError> {
        let remaining = self.bytes.len().saturating_sub(self.pos);
        let n = remaining.min(buf.len());
        buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn seek_backward(&mut self, n: u64) -> Result<(), IoError> {
        self.pos = self.pos.checked_sub(n as usize).ok_or(IoError::Rewind {
            requested: n,
            available: self.pos as u64,
        })?;
        Ok(())
    }
}

impl ReaderAt for SliceReaderAt {
    fn reader_at(&mut self, pos: u64) -> Box<dyn ByteReader + '_> {
        Box::new(SliceReader {
            bytes: &self.bytes,
            pos: pos as usize,
        })
    }
}

fn print_tokens(tree: &mut TokenTree) {
    for token in tree.iter_from_position(0) {
        println!("{:?}\t{}..{}\t(lookahead {})", token.role, token.start, token.end, token.lookahead);
    }
}

fn run() -> Result<(), CliError> {
    let args = Args::parse();
    let rule_defs = load_rules(&args.rules)?;
    let options = CompileOptions {
        max_dfa_states: args.max_dfa_states,
        ..CompileOptions::default()
    };
    let rules = CompiledRuleSet::compile(&rule_defs, options)?;
    log::info!("compiled {} rules into a {}-state DFA", rule_defs.len(), rules.num_states());

    let bytes = fs::read(&args.input).map_err(|source| CliError::Read {
        path: args.input.clone(),
        source,
    })?;
    let text_len = bytes.len() as u64;
    let mut reader_at = SliceReaderAt { bytes };

    let mut tree = syntok::rules::tokenize(&rules, &mut reader_at, text_len)?;
    print_tokens(&mut tree);

    if let Some(edits_path) = &args.edits {
        let scripted_edits = load_edits(edits_path)?;
        for scripted in scripted_edits {
            let pos = scripted.pos as usize;
            let end = pos + scripted.num_deleted as usize;
            reader_at.bytes.splice(pos..end, scripted.inserted.iter().copied());
            let edit = Edit {
                pos: scripted.pos,
                num_inserted: scripted.inserted.len() as u64,
                num_deleted: scripted.num_deleted,
            };
            println!("--- edit pos={} num_deleted={} num_inserted={} ---", edit.pos, edit.num_deleted, edit.num_inserted);
            syntok::rules::retokenize(&mut tree, edit, &rules, &mut reader_at)?;
            print_tokens(&mut tree);
        }
    }
    Ok(())
}

fn main() {
    env_logger::init();
    if let Err(e) = run() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
