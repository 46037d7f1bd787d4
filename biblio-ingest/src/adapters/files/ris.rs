//! RIS reader
//!
//! `XX  - value` lines; `TY` opens a record and `ER` closes it. Untagged
//! lines continue the previous field (long abstracts wrap this way).

use super::RecordDraft;

/// Split `TY  - JOUR` into (`TY`, `JOUR`)
fn split_tag(line: &str) -> Option<(&str, &str)> {
    let tag = line.get(..2)?;
    if !tag.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
        return None;
    }
    let rest = line[2..].trim_start_matches(' ');
    let value = rest.strip_prefix('-')?;
    Some((tag, value.trim()))
}

pub fn parse(content: &str) -> Vec<RecordDraft> {
    let mut drafts = Vec::new();
    let mut current: Option<RecordDraft> = None;
    let mut last_tag = String::new();

    for line in content.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            continue;
        }
        match split_tag(line) {
            Some(("TY", value)) => {
                if let Some(draft) = current.take() {
                    drafts.push(draft);
                }
                current = Some(RecordDraft {
                    type_label: Some(value.to_string()),
                    ..Default::default()
                });
                last_tag = "TY".to_string();
            }
            Some(("ER", _)) => {
                if let Some(draft) = current.take() {
                    drafts.push(draft);
                }
                last_tag.clear();
            }
            Some((tag, value)) => {
                if let Some(draft) = current.as_mut() {
                    apply_tag(draft, tag, value);
                    last_tag = tag.to_string();
                }
            }
            None => {
                if let Some(draft) = current.as_mut() {
                    continue_field(draft, &last_tag, line.trim());
                }
            }
        }
    }
    // Missing final ER
    if let Some(draft) = current.take() {
        drafts.push(draft);
    }

    drafts
}

fn apply_tag(draft: &mut RecordDraft, tag: &str, value: &str) {
    match tag {
        "TI" | "T1" => RecordDraft::push(&mut draft.titles, value),
        "AU" | "A1" => RecordDraft::push(&mut draft.authors, value),
        "A2" | "ED" => RecordDraft::push(&mut draft.editors, value),
        "AD" => RecordDraft::push(&mut draft.affiliations, value),
        "JO" | "JF" | "JA" | "T2" => RecordDraft::set(&mut draft.venue, value),
        "BT" => {
            RecordDraft::set(&mut draft.venue, value);
            RecordDraft::set(&mut draft.conference, value);
        }
        "C3" => RecordDraft::set(&mut draft.conference, value),
        "CY" => RecordDraft::set(&mut draft.conference_place, value),
        "PY" | "Y1" => draft.set_year(value),
        "DA" => RecordDraft::set(&mut draft.date, value),
        "VL" => RecordDraft::set(&mut draft.volume, value),
        "IS" => RecordDraft::set(&mut draft.issue, value),
        "SP" => draft.set_pages(value),
        "EP" => RecordDraft::set(&mut draft.end_page, value),
        "PB" => RecordDraft::set(&mut draft.publisher, value),
        "SN" => draft.set_standard_number(value),
        "DO" => RecordDraft::set(&mut draft.doi, value),
        "UR" | "L2" => RecordDraft::push(&mut draft.urls, value),
        "AB" | "N2" => RecordDraft::push(&mut draft.abstracts, value),
        "KW" => RecordDraft::push(&mut draft.keywords, value),
        "LA" => RecordDraft::set(&mut draft.language, value),
        _ => {}
    }
}

fn continue_field(draft: &mut RecordDraft, tag: &str, text: &str) {
    let target = match tag {
        "AB" | "N2" => draft.abstracts.last_mut(),
        "TI" | "T1" => draft.titles.last_mut(),
        _ => None,
    };
    if let Some(value) = target {
        value.push(' ');
        value.push_str(text);
    }
}
