//! Console implementation of the interactive prompt.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use visio_connect::{Choice, DocumentInfo, FileKind, Prompt};

pub struct ConsolePrompt<R> {
    input: R,
}

impl ConsolePrompt<io::StdinLock<'static>> {
    pub fn stdin() -> Self {
        Self {
            input: io::stdin().lock(),
        }
    }
}

impl<R: BufRead> ConsolePrompt<R> {
    fn ask(&mut self, question: &str) -> Option<String> {
        eprint!("{question} ");
        let _ = io::stderr().flush();
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => {
                let answer = line.trim();
                (!answer.is_empty()).then(|| answer.to_string())
            }
        }
    }
}

impl<R: BufRead> Prompt for ConsolePrompt<R> {
    fn choose(&mut self, documents: &[DocumentInfo]) -> Option<Choice> {
        if documents.is_empty() {
            eprintln!("No open Visio documents.");
        }
        for (i, doc) in documents.iter().enumerate() {
            eprintln!("  {i}: {}", doc.full_name);
        }
        eprintln!("  f: open a file");
        eprintln!("  n: new blank drawing");
        eprintln!("  t: new drawing from a template");

        let answer = self.ask("Choose (empty to cancel):")?;
        match answer.as_str() {
            "f" => Some(Choice::BrowseFile),
            "n" => Some(Choice::NewBlank),
            "t" => Some(Choice::NewFromTemplate),
            other => match other.parse() {
                Ok(index) => Some(Choice::Loaded(index)),
                Err(_) => {
                    self.warn(&format!("Invalid choice '{other}'"));
                    None
                }
            },
        }
    }

    fn pick_file(&mut self, kind: FileKind) -> Option<PathBuf> {
        let question = format!(
            "{} ({}):",
            kind.description(),
            kind.extensions().join(", ")
        );
        let path = PathBuf::from(self.ask(&question)?);
        if kind.accepts(&path) {
            Some(path)
        } else {
            self.warn(&format!("'{}' is not one of {}", path.display(), kind.description()));
            None
        }
    }

    fn warn(&mut self, message: &str) {
        eprintln!("Warning: {message}");
    }
}
