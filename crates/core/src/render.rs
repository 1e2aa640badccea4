use crate::error::RenderError;
use crate::models::{Analysis, ComparisonResult, StructuredAnalysis};
use chrono::Utc;
use docx_rs::{
    AbstractNumbering, BreakType, Docx, IndentLevel, Level, LevelJc, LevelText, NumberFormat,
    Numbering, NumberingId, Paragraph, Run, Start, Style, StyleType,
};
use serde_json::Value;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::info;

const BULLET_NUMBERING_ID: usize = 1;
const BULLET_FONT_HALF_POINTS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedReport {
    pub document_path: PathBuf,
    pub log_path: PathBuf,
    pub sections_written: usize,
    pub unparsed_logged: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSection {
    pub number: usize,
    pub report_excerpt: String,
    pub lists: Vec<(&'static str, Vec<String>)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnparsedEntry {
    pub index: usize,
    pub report_chunk_id: String,
    pub reg_chunk_id: String,
    pub raw_output: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportPlan {
    pub sections: Vec<DocumentSection>,
    pub unparsed: Vec<UnparsedEntry>,
}

/// Heading shown above each finding list.
pub fn list_label(key: &str) -> &'static str {
    match key {
        "ambiguities" => "Epäselvyydet",
        "inconsistencies" => "Ristiriitaisuudet",
        "recommendations" => "Suositukset",
        _ => "",
    }
}

pub fn document_title(source_label: &str) -> String {
    format!("FinReg Agentti – Analyysi raportille \"{source_label}.pdf\"")
}

/// Splits comparisons into document sections and log entries. Section numbers
/// count sections only; log entries keep their position in `comparisons`.
pub fn plan_report(comparisons: &[ComparisonResult]) -> ReportPlan {
    let mut plan = ReportPlan::default();

    for (position, item) in comparisons.iter().enumerate() {
        let empty = StructuredAnalysis::default();
        let structured = match &item.analysis {
            Analysis::Unparsed { raw_output } if !raw_output.trim().is_empty() => {
                plan.unparsed.push(UnparsedEntry {
                    index: position + 1,
                    report_chunk_id: item.report_chunk_id.clone(),
                    reg_chunk_id: item.reg_chunk_id.clone(),
                    raw_output: raw_output.clone(),
                });
                continue;
            }
            Analysis::Unparsed { .. } => &empty,
            Analysis::Structured(structured) => structured,
        };

        let lists = structured
            .lists()
            .into_iter()
            .filter_map(|(key, values)| match values {
                Some(values) if !values.is_empty() => Some((list_label(key), values.to_vec())),
                _ => None,
            })
            .collect();

        plan.sections.push(DocumentSection {
            number: plan.sections.len() + 1,
            report_excerpt: item.report_content.clone(),
            lists,
        });
    }

    plan
}

pub fn render(
    comparisons: &[ComparisonResult],
    source_label: &str,
    output_folder: &Path,
) -> Result<RenderedReport, RenderError> {
    render_at(comparisons, source_label, output_folder, Utc::now().timestamp())
}

/// Writes `<label>_<timestamp>.docx` and `<label>_<timestamp>.log` into
/// `output_folder`.
pub fn render_at(
    comparisons: &[ComparisonResult],
    source_label: &str,
    output_folder: &Path,
    timestamp: i64,
) -> Result<RenderedReport, RenderError> {
    fs::create_dir_all(output_folder)?;
    let log_path = output_folder.join(format!("{source_label}_{timestamp}.log"));
    let document_path = output_folder.join(format!("{source_label}_{timestamp}.docx"));

    let plan = plan_report(comparisons);

    {
        let mut log = BufWriter::new(File::create(&log_path)?);
        write_log(&mut log, &plan.unparsed)?;
        log.flush()?;
    }

    let document = build_document(&document_title(source_label), &plan.sections);
    let file = File::create(&document_path)?;
    document
        .build()
        .pack(file)
        .map_err(|error| RenderError::Docx(error.to_string()))?;

    info!(
        document = %document_path.display(),
        log = %log_path.display(),
        sections = plan.sections.len(),
        unparsed = plan.unparsed.len(),
        "comparison report written"
    );

    Ok(RenderedReport {
        document_path,
        log_path,
        sections_written: plan.sections.len(),
        unparsed_logged: plan.unparsed.len(),
    })
}

pub fn write_log<W: Write>(out: &mut W, entries: &[UnparsedEntry]) -> std::io::Result<()> {
    for entry in entries {
        write!(
            out,
            "Vertailu {} - Raporttilohkon ID: {}, Sääntelylohkon ID: {}",
            entry.index, entry.report_chunk_id, entry.reg_chunk_id
        )?;
        write!(out, "{}\n\n", entry.raw_output)?;
    }
    Ok(())
}

fn styled(text: &str, style: &str) -> Paragraph {
    Paragraph::new().add_run(Run::new().add_text(text)).style(style)
}

fn build_document(title: &str, sections: &[DocumentSection]) -> Docx {
    let bullet_level = Level::new(
        0,
        Start::new(1),
        NumberFormat::new("bullet"),
        LevelText::new("•"),
        LevelJc::new("left"),
    );

    let mut docx = Docx::new()
        .add_style(
            Style::new("Heading1", StyleType::Paragraph)
                .name("Heading 1")
                .size(32)
                .bold(),
        )
        .add_style(
            Style::new("Heading2", StyleType::Paragraph)
                .name("Heading 2")
                .size(26)
                .bold(),
        )
        .add_style(
            Style::new("IntenseQuote", StyleType::Paragraph)
                .name("Intense Quote")
                .italic()
                .bold(),
        )
        .add_abstract_numbering(AbstractNumbering::new(BULLET_NUMBERING_ID).add_level(bullet_level))
        .add_numbering(Numbering::new(BULLET_NUMBERING_ID, BULLET_NUMBERING_ID))
        .add_paragraph(styled(title, "Heading1"));

    for section in sections {
        docx = docx
            .add_paragraph(styled(&format!("Vertailu #{}", section.number), "Heading2"))
            .add_paragraph(styled("Raportin kohta, jota analysoidaan", "IntenseQuote"))
            .add_paragraph(Paragraph::new().add_run(Run::new().add_text(&section.report_excerpt)));

        for (label, entries) in &section.lists {
            docx = docx.add_paragraph(styled(&format!("{label}:"), "IntenseQuote"));
            for entry in entries {
                docx = docx.add_paragraph(
                    Paragraph::new()
                        .add_run(Run::new().add_text(entry).size(BULLET_FONT_HALF_POINTS))
                        .numbering(NumberingId::new(BULLET_NUMBERING_ID), IndentLevel::new(0)),
                );
            }
        }

        docx = docx.add_paragraph(Paragraph::new().add_run(Run::new().add_break(BreakType::Page)));
    }

    docx
}

/// Plain-text rendering of every comparison, unparsed ones included.
pub fn format_console(comparisons: &[ComparisonResult]) -> String {
    let mut out = String::new();

    for (position, item) in comparisons.iter().enumerate() {
        out.push_str(&format!("\n=== Comparison {} ===\n", position + 1));
        out.push_str(&format!("Report Chunk ID: {}\n", item.report_chunk_id));
        out.push_str(&format!("Regulation Chunk ID: {}\n", item.reg_chunk_id));
        out.push_str(&format!("Section: {}\n\n", item.section));

        match &item.analysis {
            Analysis::Unparsed { raw_output } if !raw_output.is_empty() => {
                out.push_str("Raw Output:\n");
                let pretty = serde_json::from_str::<Value>(raw_output)
                    .ok()
                    .and_then(|value| serde_json::to_string_pretty(&value).ok());
                out.push_str(pretty.as_deref().unwrap_or(raw_output));
                out.push('\n');
            }
            Analysis::Unparsed { .. } => {}
            Analysis::Structured(structured) => {
                for (key, values) in structured.lists() {
                    let Some(values) = values.filter(|values| !values.is_empty()) else {
                        continue;
                    };
                    out.push_str(&format!("\n{}:\n", capitalize(key)));
                    for value in values {
                        out.push_str(&format!("  - {value}\n"));
                    }
                }
            }
        }
    }

    out
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
