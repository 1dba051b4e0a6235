#![allow(dead_code)]

use quick_xml::Reader;
use quick_xml::events::Event;
use serde_json::{Value, json};
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

pub const TEMPLATE_BODY: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main"><w:body>"#,
    r#"<w:p><w:r><w:t>Ergebnisse für {{Code}}</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t>GAD: {</w:t></w:r><w:r><w:rPr><w:b/></w:rPr><w:t>{GAD}}</w:t></w:r></w:p>"#,
    r#"<w:p><w:r><w:t>WURS-K: {{WursK}} / SPIN: {{SPIN}} / Hase: {{HaseHYP}}</w:t></w:r></w:p>"#,
    r#"</w:body></w:document>"#
);

pub fn docx(parts: &[(&str, &str)]) -> Vec<u8> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, body) in parts {
        writer
            .start_file(*name, SimpleFileOptions::default())
            .unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

pub fn report_template() -> Vec<u8> {
    docx(&[
        ("[Content_Types].xml", "<Types/>"),
        ("word/document.xml", TEMPLATE_BODY),
    ])
}

/// Visible text of `word/document.xml`, one line per paragraph.
pub fn document_text(bytes: &[u8]) -> String {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();

    let mut reader = Reader::from_str(&xml);
    let mut lines: Vec<String> = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut in_text = false;
    loop {
        match reader.read_event().unwrap() {
            Event::Start(e) if e.name().as_ref() == b"w:p" => {
                open.push(lines.len());
                lines.push(String::new());
            }
            Event::End(e) if e.name().as_ref() == b"w:p" => {
                open.pop();
            }
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_text = true,
            Event::End(e) if e.name().as_ref() == b"w:t" => in_text = false,
            Event::Text(e) if in_text => {
                if let Some(&line) = open.last() {
                    lines[line].push_str(&e.unescape().unwrap());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    lines.join("\n")
}

pub fn master_rows() -> Vec<Vec<Value>> {
    vec![
        vec![
            json!("Code"),
            json!("GAD7"),
            json!("Wurs-K"),
            json!("Mini SPIN"),
            json!("Hase Überaktivität"),
        ],
        vec![json!("code1"), json!("3"), json!("40"), json!("11"), json!("7")],
        vec![json!("code2"), json!("12"), json!("5"), json!("21"), json!("9")],
        vec![json!("code3"), json!("8")],
    ]
}
