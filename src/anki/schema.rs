//! The `collection.anki2` SQLite database inside a deck archive
//!
//! Schema version 11, the format every Anki release can import.

use std::path::Path;
use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use rusqlite::{params, Connection};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

use super::Result;
use crate::cards::FormattedNote;

/// Fixed id of the two-field note model
pub const MODEL_ID: i64 = 1_607_392_319;
pub const MODEL_NAME: &str = "deckgen word card";

const FIELD_SEPARATOR: char = '\u{1f}';

const SCHEMA: &str = r#"
CREATE TABLE col (
    id              integer primary key,
    crt             integer not null,
    mod             integer not null,
    scm             integer not null,
    ver             integer not null,
    dty             integer not null,
    usn             integer not null,
    ls              integer not null,
    conf            text not null,
    models          text not null,
    decks           text not null,
    dconf           text not null,
    tags            text not null
);
CREATE TABLE notes (
    id              integer primary key,
    guid            text not null,
    mid             integer not null,
    mod             integer not null,
    usn             integer not null,
    tags            text not null,
    flds            text not null,
    sfld            integer not null,
    csum            integer not null,
    flags           integer not null,
    data            text not null
);
CREATE TABLE cards (
    id              integer primary key,
    nid             integer not null,
    did             integer not null,
    ord             integer not null,
    mod             integer not null,
    usn             integer not null,
    type            integer not null,
    queue           integer not null,
    due             integer not null,
    ivl             integer not null,
    factor          integer not null,
    reps            integer not null,
    lapses          integer not null,
    left            integer not null,
    odue            integer not null,
    odid            integer not null,
    flags           integer not null,
    data            text not null
);
CREATE TABLE revlog (
    id              integer primary key,
    cid             integer not null,
    usn             integer not null,
    ease            integer not null,
    ivl             integer not null,
    lastIvl         integer not null,
    factor          integer not null,
    time            integer not null,
    type            integer not null
);
CREATE TABLE graves (
    usn             integer not null,
    oid             integer not null,
    type            integer not null
);
CREATE INDEX ix_notes_usn ON notes (usn);
CREATE INDEX ix_cards_usn ON cards (usn);
CREATE INDEX ix_revlog_usn ON revlog (usn);
CREATE INDEX ix_cards_nid ON cards (nid);
CREATE INDEX ix_cards_sched ON cards (did, queue, due);
CREATE INDEX ix_revlog_cid ON revlog (cid);
CREATE INDEX ix_notes_csum ON notes (csum);
"#;

const CARD_CSS: &str = ".card {\n font-family: arial;\n font-size: 20px;\n text-align: center;\n color: black;\n background-color: white;\n}\n.word { font-size: 32px; font-weight: bold; }\n.image img { max-width: 90%; }\n.explanation { text-align: left; }\n";

const LATEX_PRE: &str = "\\documentclass[12pt]{article}\n\\special{papersize=3in,5in}\n\\usepackage[utf8]{inputenc}\n\\usepackage{amssymb,amsmath}\n\\pagestyle{empty}\n\\setlength{\\parindent}{0in}\n\\begin{document}\n";

/// Deck identity inside a collection
#[derive(Debug, Clone)]
pub struct DeckInfo {
    pub id: i64,
    pub name: String,
}

/// Create the collection database at `path` and fill it with `notes`
pub fn write_collection(path: &Path, deck: &DeckInfo, notes: &[FormattedNote]) -> Result<()> {
    let mut conn = Connection::open(path)?;
    conn.execute_batch(SCHEMA)?;

    let now = Utc::now();
    let now_secs = now.timestamp();
    let now_ms = now.timestamp_millis();

    conn.execute(
        "INSERT INTO col (id, crt, mod, scm, ver, dty, usn, ls, conf, models, decks, dconf, tags)
         VALUES (1, ?1, ?2, ?2, 11, 0, 0, 0, ?3, ?4, ?5, ?6, '{}')",
        params![
            now_secs,
            now_ms,
            collection_conf().to_string(),
            models_json(deck.id, now_secs).to_string(),
            decks_json(deck, now_secs).to_string(),
            deck_conf_json().to_string(),
        ],
    )?;

    let tx = conn.transaction()?;
    for (position, note) in notes.iter().enumerate() {
        // Millisecond ids, offset by position to stay unique within one export
        let id = now_ms + position as i64;
        let sort_field = strip_html(&note.front_html);

        tx.execute(
            "INSERT INTO notes (id, guid, mid, mod, usn, tags, flds, sfld, csum, flags, data)
             VALUES (?1, ?2, ?3, ?4, -1, ?5, ?6, ?7, ?8, 0, '')",
            params![
                id,
                new_guid(),
                MODEL_ID,
                now_secs,
                tag_string(note),
                format!("{}{}{}", note.front_html, FIELD_SEPARATOR, note.back_html),
                sort_field,
                field_checksum(&sort_field),
            ],
        )?;

        tx.execute(
            "INSERT INTO cards (id, nid, did, ord, mod, usn, type, queue, due, ivl, factor,
                                reps, lapses, left, odue, odid, flags, data)
             VALUES (?1, ?1, ?2, 0, ?3, -1, 0, 0, ?4, 0, 0, 0, 0, 0, 0, 0, 0, '')",
            params![id, deck.id, now_secs, position as i64 + 1],
        )?;
    }
    tx.commit()?;

    Ok(())
}

/// Space-delimited tag list with the leading and trailing space Anki expects
fn tag_string(note: &FormattedNote) -> String {
    if note.tags.is_empty() {
        return String::new();
    }
    let tags: Vec<&str> = note.tags.iter().map(String::as_str).collect();
    format!(" {} ", tags.join(" "))
}

fn new_guid() -> String {
    hex::encode(rand::random::<[u8; 8]>())
}

/// Plain text of a field, used as the sort field
pub fn strip_html(html: &str) -> String {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    let tag_re = TAG_RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap());

    let text = tag_re.replace_all(html, " ");
    let text = html_escape::decode_html_entities(&text);
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Duplicate-detection checksum: the first 32 bits of the field digest
pub fn field_checksum(sort_field: &str) -> i64 {
    let digest = Sha256::digest(sort_field.as_bytes());
    i64::from(u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]]))
}

fn collection_conf() -> Value {
    json!({
        "activeDecks": [1],
        "curDeck": 1,
        "newSpread": 0,
        "collapseTime": 1200,
        "timeLim": 0,
        "estTimes": true,
        "dueCounts": true,
        "curModel": null,
        "nextPos": 1,
        "sortType": "noteFld",
        "sortBackwards": false,
        "addToCur": true
    })
}

fn models_json(deck_id: i64, now_secs: i64) -> Value {
    let field = |name: &str, ord: i64| {
        json!({
            "name": name,
            "ord": ord,
            "font": "Arial",
            "media": [],
            "rtl": false,
            "size": 20,
            "sticky": false
        })
    };

    let model = json!({
        "id": MODEL_ID,
        "name": MODEL_NAME,
        "type": 0,
        "mod": now_secs,
        "usn": -1,
        "sortf": 0,
        "did": deck_id,
        "tmpls": [{
            "name": "Card 1",
            "ord": 0,
            "qfmt": "{{Front}}",
            "afmt": "{{FrontSide}}\n\n<hr id=answer>\n\n{{Back}}",
            "bqfmt": "",
            "bafmt": "",
            "did": null
        }],
        "flds": [field("Front", 0), field("Back", 1)],
        "css": CARD_CSS,
        "latexPre": LATEX_PRE,
        "latexPost": "\\end{document}",
        "tags": [],
        "vers": [],
        "req": [[0, "any", [0]]]
    });

    json!({ MODEL_ID.to_string(): model })
}

fn deck_json(id: i64, name: &str, now_secs: i64) -> Value {
    json!({
        "id": id,
        "name": name,
        "desc": "",
        "mod": now_secs,
        "usn": -1,
        "collapsed": false,
        "conf": 1,
        "dyn": 0,
        "extendNew": 10,
        "extendRev": 50,
        "newToday": [0, 0],
        "revToday": [0, 0],
        "lrnToday": [0, 0],
        "timeToday": [0, 0]
    })
}

fn decks_json(deck: &DeckInfo, now_secs: i64) -> Value {
    json!({
        "1": deck_json(1, "Default", now_secs),
        deck.id.to_string(): deck_json(deck.id, &deck.name, now_secs)
    })
}

fn deck_conf_json() -> Value {
    json!({
        "1": {
            "id": 1,
            "name": "Default",
            "mod": 0,
            "usn": 0,
            "maxTaken": 60,
            "autoplay": true,
            "timer": 0,
            "replayq": true,
            "dyn": false,
            "new": {
                "bury": true,
                "delays": [1, 10],
                "initialFactor": 2500,
                "ints": [1, 4, 7],
                "order": 1,
                "perDay": 20,
                "separate": true
            },
            "lapse": {
                "delays": [10],
                "leechAction": 0,
                "leechFails": 8,
                "minInt": 1,
                "mult": 0
            },
            "rev": {
                "bury": true,
                "ease4": 1.3,
                "fuzz": 0.05,
                "ivlFct": 1,
                "maxIvl": 36500,
                "minSpace": 1,
                "perDay": 100
            }
        }
    })
}
