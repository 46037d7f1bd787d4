//! BibTeX reader
//!
//! Handles `@type{key, field = {value}, ...}` entries with braced, quoted or
//! bare values and `#` concatenation. `@comment`, `@string` and `@preamble`
//! blocks are skipped. Authors are `and`-separated.

use tracing::warn;

use super::{split_list, RecordDraft};

struct Cursor {
    chars: Vec<char>,
    pos: usize,
}

impl Cursor {
    fn new(content: &str) -> Self {
        Self {
            chars: content.chars().collect(),
            pos: 0,
        }
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += 1;
        Some(c)
    }

    fn skip_whitespace(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn take_while(&mut self, predicate: impl Fn(char) -> bool) -> String {
        let start = self.pos;
        while self.peek().is_some_and(&predicate) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    /// Contents of a `{...}` group, cursor positioned on the opening brace
    fn braced(&mut self) -> Option<String> {
        self.bump();
        let mut depth = 1;
        let mut out = String::new();
        while let Some(c) = self.bump() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(out);
                    }
                }
                _ => {}
            }
            out.push(c);
        }
        None
    }

    fn quoted(&mut self) -> Option<String> {
        self.bump();
        let mut depth = 0;
        let mut out = String::new();
        while let Some(c) = self.bump() {
            match c {
                '{' => depth += 1,
                '}' => depth -= 1,
                '"' if depth == 0 => return Some(out),
                _ => {}
            }
            out.push(c);
        }
        None
    }

    /// One field value, following `#` concatenations
    fn value(&mut self) -> Option<String> {
        let mut out = String::new();
        loop {
            self.skip_whitespace();
            match self.peek()? {
                '{' => out.push_str(&self.braced()?),
                '"' => out.push_str(&self.quoted()?),
                _ => out.push_str(
                    self.take_while(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'))
                        .as_str(),
                ),
            }
            self.skip_whitespace();
            if self.peek() == Some('#') {
                self.bump();
                continue;
            }
            return Some(out);
        }
    }
}

pub fn parse(content: &str) -> Vec<RecordDraft> {
    let mut cursor = Cursor::new(content);
    let mut drafts = Vec::new();

    while let Some(c) = cursor.bump() {
        if c != '@' {
            continue;
        }
        let entry_type = cursor.take_while(char::is_alphanumeric).to_ascii_lowercase();
        cursor.skip_whitespace();
        let Some(open) = cursor.bump() else { break };
        if open != '{' && open != '(' {
            continue;
        }
        if matches!(entry_type.as_str(), "comment" | "string" | "preamble") {
            cursor.pos -= 1;
            if open == '{' {
                cursor.braced();
            }
            continue;
        }

        let key = cursor.take_while(|c| c != ',' && c != '}' && c != ')');
        cursor.bump();

        match parse_fields(&mut cursor, &entry_type) {
            Some(draft) => drafts.push(draft),
            None => warn!(key = %key.trim(), "Skipping truncated BibTeX entry"),
        }
    }

    drafts
}

fn parse_fields(cursor: &mut Cursor, entry_type: &str) -> Option<RecordDraft> {
    let mut draft = RecordDraft {
        type_label: Some(entry_type.to_string()),
        ..Default::default()
    };

    loop {
        cursor.skip_whitespace();
        match cursor.peek()? {
            '}' | ')' => {
                cursor.bump();
                return Some(draft);
            }
            ',' => {
                cursor.bump();
                continue;
            }
            _ => {}
        }

        let name = cursor
            .take_while(|c| c.is_alphanumeric() || c == '_' || c == '-')
            .to_ascii_lowercase();
        cursor.skip_whitespace();
        if name.is_empty() || cursor.bump()? != '=' {
            return None;
        }
        let value = clean(&cursor.value()?);
        apply_field(&mut draft, entry_type, &name, &value);
    }
}

fn apply_field(draft: &mut RecordDraft, entry_type: &str, name: &str, value: &str) {
    match name {
        "title" => RecordDraft::push(&mut draft.titles, value),
        "subtitle" => RecordDraft::set(&mut draft.subtitle, value),
        "author" => draft.authors.extend(split_list(value, &[" and "])),
        "editor" => draft.editors.extend(split_list(value, &[" and "])),
        "affiliation" | "affiliations" => draft.affiliations.extend(split_list(value, &[";"])),
        "journal" | "journaltitle" => RecordDraft::set(&mut draft.venue, value),
        "booktitle" => {
            RecordDraft::set(&mut draft.venue, value);
            if entry_type == "inproceedings" || entry_type == "conference" {
                RecordDraft::set(&mut draft.conference, value);
            }
        }
        "eventtitle" => RecordDraft::set(&mut draft.conference, value),
        "venue" | "address" | "location" if entry_type == "inproceedings" => {
            RecordDraft::set(&mut draft.conference_place, value)
        }
        "year" => RecordDraft::set(&mut draft.year, value),
        "date" => RecordDraft::set(&mut draft.date, value),
        "volume" => RecordDraft::set(&mut draft.volume, value),
        "number" | "issue" => RecordDraft::set(&mut draft.issue, value),
        "pages" => draft.set_pages(value),
        "numpages" | "pagetotal" => draft.number_of_pages = value.parse().ok(),
        "publisher" => RecordDraft::set(&mut draft.publisher, value),
        "school" | "institution" if draft.publisher.is_none() => {
            RecordDraft::set(&mut draft.publisher, value)
        }
        "language" | "langid" => RecordDraft::set(&mut draft.language, value),
        "doi" => RecordDraft::set(&mut draft.doi, value),
        "isbn" => RecordDraft::set(&mut draft.isbn, value),
        "issn" => RecordDraft::set(&mut draft.issn, value),
        "url" => RecordDraft::push(&mut draft.urls, value),
        "abstract" => RecordDraft::push(&mut draft.abstracts, value),
        "keywords" | "author_keywords" => draft.keywords.extend(split_list(value, &[";", ","])),
        _ => {}
    }
}

/// Drop grouping braces and common escapes, collapse whitespace
fn clean(value: &str) -> String {
    value
        .replace(['{', '}'], "")
        .replace("\\&", "&")
        .replace("\\%", "%")
        .replace("\\_", "_")
        .replace("--", "-")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::files::{parse_file, FileFormat};
    use crate::models::PublicationType;

    const SAMPLE: &str = r#"
@comment{exported by a reference manager}
@string{jfi = "Journal of Format Inference"}

@article{doe2020,
  title     = {Parsing {BibTeX} the Hard Way},
  author    = {Doe, Jane and Roe, Richard},
  journal   = "Journal of " # "Format Inference",
  year      = 2020,
  volume    = {7},
  number    = {2},
  pages     = {10--20},
  doi       = {10.1234/JFI.2020.7},
  keywords  = {parsing; bibtex},
  abstract  = {We parse \& survive.},
}

@inproceedings{smith2021,
  title     = {Streaming Things},
  author    = {Smith, Ann},
  booktitle = {Proceedings of the Data Conference},
  address   = {Novi Sad},
  year      = {2021}
}

@misc{broken,
  title = {Never closed
"#;

    #[test]
    fn test_parses_entries() {
        let drafts = parse(SAMPLE);
        assert_eq!(drafts.len(), 2);

        let article = &drafts[0];
        assert_eq!(article.titles, vec!["Parsing BibTeX the Hard Way"]);
        assert_eq!(article.authors, vec!["Doe, Jane", "Roe, Richard"]);
        assert_eq!(article.venue.as_deref(), Some("Journal of Format Inference"));
        assert_eq!(article.year.as_deref(), Some("2020"));
        assert_eq!(article.start_page.as_deref(), Some("10"));
        assert_eq!(article.end_page.as_deref(), Some("20"));
        assert_eq!(article.keywords, vec!["parsing", "bibtex"]);
        assert_eq!(article.abstracts, vec!["We parse & survive."]);
    }

    #[test]
    fn test_records_from_file() {
        let records = parse_file(FileFormat::Bibtex, SAMPLE);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].identifier, "BIBTEX:10.1234/jfi.2020.7");
        assert_eq!(records[0].publication_type, PublicationType::JournalPublication);
        assert_eq!(records[0].contributions[1].person.name.last_name, "Roe");

        let paper = &records[1];
        assert_eq!(paper.publication_type, PublicationType::ProceedingsPublication);
        let event = paper.event.as_ref().unwrap();
        assert_eq!(event.name[0].content, "Proceedings of the Data Conference");
        assert_eq!(event.place.as_deref(), Some("Novi Sad"));
    }
}
