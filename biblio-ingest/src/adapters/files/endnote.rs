//! EndNote tagged (refer) reader
//!
//! `%X value` lines; `%0` carries the reference type and a blank line ends
//! the record. `%+` lines are author affiliations.

use super::{split_list, RecordDraft};

pub fn parse(content: &str) -> Vec<RecordDraft> {
    let mut drafts = Vec::new();
    let mut current = RecordDraft::default();
    let mut last_tag: Option<char> = None;

    for line in content.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            flush(&mut drafts, &mut current);
            last_tag = None;
            continue;
        }

        let mut chars = line.chars();
        match (chars.next(), chars.next()) {
            (Some('%'), Some(tag)) => {
                let value = chars.as_str().trim();
                if tag == '0' && !current.is_empty() {
                    flush(&mut drafts, &mut current);
                }
                apply_tag(&mut current, tag, value);
                last_tag = Some(tag);
            }
            _ => {
                // Wrapped continuation of the previous field
                if last_tag == Some('X') {
                    if let Some(abstract_text) = current.abstracts.last_mut() {
                        abstract_text.push(' ');
                        abstract_text.push_str(line.trim());
                    }
                }
            }
        }
    }
    flush(&mut drafts, &mut current);

    drafts
}

fn flush(drafts: &mut Vec<RecordDraft>, current: &mut RecordDraft) {
    if !current.is_empty() {
        drafts.push(std::mem::take(current));
    }
}

fn apply_tag(draft: &mut RecordDraft, tag: char, value: &str) {
    match tag {
        '0' => RecordDraft::set(&mut draft.type_label, value),
        'T' => RecordDraft::push(&mut draft.titles, value),
        'A' => RecordDraft::push(&mut draft.authors, value),
        'E' => RecordDraft::push(&mut draft.editors, value),
        '+' => RecordDraft::push(&mut draft.affiliations, value),
        'J' => RecordDraft::set(&mut draft.venue, value),
        'B' => {
            RecordDraft::set(&mut draft.venue, value);
            RecordDraft::set(&mut draft.conference, value);
        }
        'C' => RecordDraft::set(&mut draft.conference_place, value),
        'D' => draft.set_year(value),
        '8' => RecordDraft::set(&mut draft.date, value),
        'V' => RecordDraft::set(&mut draft.volume, value),
        'N' => RecordDraft::set(&mut draft.issue, value),
        'P' => draft.set_pages(value),
        'I' => RecordDraft::set(&mut draft.publisher, value),
        '@' => draft.set_standard_number(value),
        'R' => RecordDraft::set(&mut draft.doi, value),
        'U' => RecordDraft::push(&mut draft.urls, value),
        'X' => RecordDraft::push(&mut draft.abstracts, value),
        'K' => draft.keywords.extend(split_list(value, &[";"])),
        'G' => RecordDraft::set(&mut draft.language, value),
        _ => {}
    }
}
