//! PDF estimate export.
//!
//! Letter pages with built-in Helvetica. Text is laid out top-down with
//! simple column positions and a new page starts whenever the cursor reaches
//! the bottom margin.

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use printpdf::{
    BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
};
use std::collections::BTreeMap;

use crate::domain::estimation::{EstimationResult, InputSummary};
use crate::domain::narrative::ModuleSubtasks;

const PAGE_WIDTH: f32 = 215.9;
const PAGE_HEIGHT: f32 = 279.4;
const MARGIN: f32 = 18.0;
const PT_TO_MM: f32 = 0.3528;
/// Average Helvetica glyph width as a fraction of the font size
const GLYPH_WIDTH: f32 = 0.5;

const TITLE_SIZE: f32 = 18.0;
const HEADING_SIZE: f32 = 13.0;
const BODY_SIZE: f32 = 10.0;
const SMALL_SIZE: f32 = 9.0;

/// Everything that goes into a rendered estimate.
pub struct EstimateReport<'a> {
    pub title: &'a str,
    pub project_name: Option<&'a str>,
    pub generated_at: DateTime<Utc>,
    pub summary: &'a InputSummary,
    pub result: &'a EstimationResult,
    pub narrative: &'a BTreeMap<String, String>,
    pub subtasks: &'a [ModuleSubtasks],
    /// Extra label/value lines printed under the title
    pub details: Vec<(&'static str, String)>,
}

/// `$1,234.56`
pub fn format_currency(value: f64) -> String {
    let cents = (value.abs() * 100.0).round() as u64;
    let sign = if value < 0.0 && cents > 0 { "-" } else { "" };
    format!("{sign}${}.{:02}", group_thousands(cents / 100), cents % 100)
}

/// `1,234.5`
pub fn format_hours(value: f64) -> String {
    let tenths = (value.abs() * 10.0).round() as u64;
    let sign = if value < 0.0 && tenths > 0 { "-" } else { "" };
    format!("{sign}{}.{}", group_thousands(tenths / 10), tenths % 10)
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn share(part: f64, total: f64) -> String {
    if total > 0.0 {
        format!("{:.1}%", part / total * 100.0)
    } else {
        "-".to_string()
    }
}

/// `executive_summary` -> `Executive Summary`
fn section_title(key: &str) -> String {
    key.split(|c: char| c == '_' || c == '-')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Built-in fonts only cover WinAnsi; common typography is mapped to ASCII.
fn pdf_safe(text: &str) -> String {
    text.chars()
        .filter_map(|c| match c {
            '\u{2018}' | '\u{2019}' => Some('\''),
            '\u{201C}' | '\u{201D}' => Some('"'),
            '\u{2010}'..='\u{2015}' | '\u{2022}' => Some('-'),
            '\u{00A0}' | '\t' => Some(' '),
            c if c.is_ascii() && !c.is_ascii_control() => Some(c),
            c if ('\u{00A1}'..='\u{00FF}').contains(&c) => Some(c),
            _ => None,
        })
        .collect()
}

/// Greedy word wrap; words longer than a line are split.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(8);
    let mut lines = Vec::new();
    for paragraph in text.split('\n') {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();
            while word.len() > max_chars {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }
            let word: String = word.into_iter().collect();
            let needed = if current.is_empty() {
                word.chars().count()
            } else {
                current.chars().count() + 1 + word.chars().count()
            };
            if needed > max_chars && !current.is_empty() {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(&word);
        }
        if !current.is_empty() {
            lines.push(current);
        }
    }
    lines
}

struct PdfWriter {
    doc: PdfDocumentReference,
    layer: PdfLayerReference,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    /// Cursor from the page bottom, millimetres
    y: f32,
    pages: usize,
}

impl PdfWriter {
    fn new(title: &str) -> Result<Self> {
        let (doc, page, layer) =
            PdfDocument::new(pdf_safe(title), Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let regular = doc
            .add_builtin_font(BuiltinFont::Helvetica)
            .map_err(|e| anyhow!("Failed to load Helvetica: {e:?}"))?;
        let bold = doc
            .add_builtin_font(BuiltinFont::HelveticaBold)
            .map_err(|e| anyhow!("Failed to load Helvetica-Bold: {e:?}"))?;
        let layer = doc.get_page(page).get_layer(layer);
        Ok(Self {
            doc,
            layer,
            regular,
            bold,
            y: PAGE_HEIGHT - MARGIN,
            pages: 1,
        })
    }

    fn line_height(size: f32) -> f32 {
        size * PT_TO_MM * 1.4
    }

    fn chars_per_line(size: f32, indent: f32) -> usize {
        let usable_pt = (PAGE_WIDTH - 2.0 * MARGIN - indent) / PT_TO_MM;
        (usable_pt / (size * GLYPH_WIDTH)) as usize
    }

    fn new_page(&mut self) {
        let (page, layer) = self
            .doc
            .add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        self.layer = self.doc.get_page(page).get_layer(layer);
        self.y = PAGE_HEIGHT - MARGIN;
        self.pages += 1;
    }

    fn ensure_space(&mut self, height: f32) {
        if self.y - height < MARGIN {
            self.new_page();
        }
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }

    /// One line of cells at fixed x offsets from the left margin
    fn row(&mut self, cells: &[(f32, &str)], size: f32, bold: bool) {
        let height = Self::line_height(size);
        self.ensure_space(height);
        self.y -= height;
        let font = if bold { &self.bold } else { &self.regular };
        for (x, text) in cells {
            self.layer
                .use_text(pdf_safe(text), size, Mm(MARGIN + x), Mm(self.y), font);
        }
    }

    fn text(&mut self, text: &str, size: f32, bold: bool) {
        self.row(&[(0.0, text)], size, bold);
    }

    fn paragraph(&mut self, text: &str, size: f32, indent: f32) {
        for line in wrap_text(&pdf_safe(text), Self::chars_per_line(size, indent)) {
            self.row(&[(indent, line.as_str())], size, false);
        }
    }

    fn heading(&mut self, text: &str) {
        // Keep a heading with at least two lines of what follows
        self.ensure_space(Self::line_height(HEADING_SIZE) + 2.0 * Self::line_height(BODY_SIZE) + 4.0);
        self.gap(4.0);
        self.text(text, HEADING_SIZE, true);
        self.gap(1.5);
    }

    fn finish(self) -> Result<Vec<u8>> {
        self.doc
            .save_to_bytes()
            .map_err(|e| anyhow!("Failed to serialize PDF: {e:?}"))
    }
}

const COST_COLUMNS: [f32; 3] = [0.0, 90.0, 140.0];
const MODULE_COLUMNS: [f32; 4] = [0.0, 85.0, 110.0, 140.0];
const ROLE_COLUMNS: [f32; 4] = [0.0, 70.0, 105.0, 140.0];

/// Render an estimate to PDF bytes.
pub fn render_estimate_pdf(report: &EstimateReport<'_>) -> Result<Vec<u8>> {
    let result = report.result;
    let mut pdf = PdfWriter::new(report.title)?;

    pdf.text(report.title, TITLE_SIZE, true);
    if let Some(project) = report.project_name {
        pdf.gap(1.0);
        pdf.text(project, HEADING_SIZE, false);
    }
    pdf.gap(1.0);
    pdf.text(
        &format!("Generated {}", report.generated_at.format("%B %-d, %Y %H:%M UTC")),
        SMALL_SIZE,
        false,
    );
    for (label, value) in &report.details {
        pdf.row(&[(0.0, *label), (50.0, value.as_str())], SMALL_SIZE, false);
    }

    pdf.heading("Summary");
    let summary_rows = [
        ("Total labor hours", format_hours(result.total_labor_hours)),
        ("Total cost", format_currency(result.total_cost)),
        ("Effective hourly rate", format_currency(result.effective_hourly_rate)),
        ("FTE years", format!("{:.2}", result.fte_years)),
        ("Complexity", report.summary.complexity.code().to_string()),
        ("Modules", report.summary.module_count.to_string()),
        ("Sites", report.summary.sites.to_string()),
    ];
    for (label, value) in &summary_rows {
        pdf.row(&[(0.0, *label), (60.0, value.as_str())], BODY_SIZE, false);
    }

    pdf.heading("Cost Breakdown");
    pdf.row(
        &[
            (COST_COLUMNS[0], "Component"),
            (COST_COLUMNS[1], "Amount"),
            (COST_COLUMNS[2], "Share"),
        ],
        BODY_SIZE,
        true,
    );
    let total = result.total_cost;
    let mut cost_rows = vec![
        ("Labor", result.total_labor_cost),
        ("Risk reserve", result.risk_reserve),
        ("Overhead", result.overhead_cost),
        ("Other direct costs", result.odc_total),
    ];
    if result.prime_margin > 0.0 {
        cost_rows.push(("Prime contractor margin", result.prime_margin));
    }
    if result.management_reserve > 0.0 {
        cost_rows.push(("Management reserve", result.management_reserve));
    }
    for (label, amount) in cost_rows {
        let (amount_text, share_text) = (format_currency(amount), share(amount, total));
        pdf.row(
            &[
                (COST_COLUMNS[0], label),
                (COST_COLUMNS[1], amount_text.as_str()),
                (COST_COLUMNS[2], share_text.as_str()),
            ],
            BODY_SIZE,
            false,
        );
    }
    let total_text = format_currency(total);
    pdf.row(
        &[
            (COST_COLUMNS[0], "Total"),
            (COST_COLUMNS[1], total_text.as_str()),
            (COST_COLUMNS[2], if total > 0.0 { "100.0%" } else { "-" }),
        ],
        BODY_SIZE,
        true,
    );

    if !result.odc_items.is_empty() {
        pdf.gap(2.0);
        for item in &result.odc_items {
            let amount = format_currency(item.total());
            let unit = format!("{} x {}", item.quantity, format_currency(item.unit_cost));
            pdf.row(
                &[
                    (4.0, item.description.as_str()),
                    (COST_COLUMNS[1], amount.as_str()),
                    (COST_COLUMNS[2], unit.as_str()),
                ],
                SMALL_SIZE,
                false,
            );
        }
    }

    if !result.breakdown_by_module.is_empty() {
        pdf.heading("Module Breakdown");
        pdf.row(
            &[
                (MODULE_COLUMNS[0], "Module"),
                (MODULE_COLUMNS[1], "Focus"),
                (MODULE_COLUMNS[2], "Hours"),
                (MODULE_COLUMNS[3], "Cost"),
            ],
            BODY_SIZE,
            true,
        );
        for module in result.breakdown_by_module.values() {
            let (hours, cost) = (format_hours(module.hours), format_currency(module.cost));
            pdf.row(
                &[
                    (MODULE_COLUMNS[0], module.module_name.as_str()),
                    (MODULE_COLUMNS[1], module.focus_area.code()),
                    (MODULE_COLUMNS[2], hours.as_str()),
                    (MODULE_COLUMNS[3], cost.as_str()),
                ],
                SMALL_SIZE,
                false,
            );
        }
    }

    if !result.historical_adjustments.is_empty() {
        pdf.heading("Historical Calibration");
        for adj in &result.historical_adjustments {
            pdf.paragraph(
                &format!(
                    "{}: estimated {} h, historical average {} h over {} engagements, blended to {} h.",
                    adj.module_id,
                    format_hours(adj.estimated_hours),
                    format_hours(adj.actual_average),
                    adj.sample_count,
                    format_hours(adj.blended_hours),
                ),
                SMALL_SIZE,
                0.0,
            );
        }
    }

    if !result.breakdown_by_role.is_empty() {
        pdf.heading("Labor Breakdown");
        pdf.row(
            &[
                (ROLE_COLUMNS[0], "Role"),
                (ROLE_COLUMNS[1], "Hours"),
                (ROLE_COLUMNS[2], "Rate"),
                (ROLE_COLUMNS[3], "Cost"),
            ],
            BODY_SIZE,
            true,
        );
        for role in result.breakdown_by_role.values() {
            let hours = format_hours(role.hours);
            let rate = format_currency(role.effective_rate);
            let cost = format_currency(role.cost);
            pdf.row(
                &[
                    (ROLE_COLUMNS[0], role.role_name.as_str()),
                    (ROLE_COLUMNS[1], hours.as_str()),
                    (ROLE_COLUMNS[2], rate.as_str()),
                    (ROLE_COLUMNS[3], cost.as_str()),
                ],
                SMALL_SIZE,
                false,
            );
        }
    }

    for (key, text) in report.narrative {
        if text.trim().is_empty() {
            continue;
        }
        pdf.heading(&section_title(key));
        pdf.paragraph(text, BODY_SIZE, 0.0);
    }

    if !report.subtasks.is_empty() {
        pdf.heading("Module Subtasks");
        for module in report.subtasks {
            pdf.gap(1.5);
            pdf.text(
                &format!("{} ({} h)", module.module_name, format_hours(module.hours)),
                BODY_SIZE,
                true,
            );
            for (i, task) in module.subtasks.iter().enumerate() {
                let owner = task
                    .role
                    .as_deref()
                    .map(|r| format!(", {r}"))
                    .unwrap_or_default();
                pdf.paragraph(
                    &format!("{}. {} ({} h{})", i + 1, task.title, format_hours(task.hours), owner),
                    SMALL_SIZE,
                    4.0,
                );
                if !task.description.is_empty() {
                    pdf.paragraph(&task.description, SMALL_SIZE, 8.0);
                }
            }
        }
    }

    tracing::debug!(pages = pdf.pages, "Rendered estimate PDF");
    pdf.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::ComplexityLevel;
    use crate::domain::estimation::EstimationInput;
    use crate::services::calculation::Calculator;
    use crate::services::catalog::Catalog;
    use std::sync::Arc;

    fn render(narrative: BTreeMap<String, String>) -> Vec<u8> {
        let input = EstimationInput::new(
            vec!["dt_discovery".to_string(), "sa_audit".to_string()],
            ComplexityLevel::Large,
        );
        let result = Calculator::new(Arc::new(Catalog::new()))
            .calculate(&input)
            .unwrap();
        let summary = InputSummary::from_input(&input, None);
        let report = EstimateReport {
            title: "Project Estimation Report",
            project_name: Some("Agency Modernization"),
            generated_at: Utc::now(),
            summary: &summary,
            result: &result,
            narrative: &narrative,
            subtasks: &[],
            details: vec![("Estimating method", "Bottom-up".to_string())],
        };
        render_estimate_pdf(&report).unwrap()
    }

    #[test]
    fn test_render_produces_pdf() {
        let bytes = render(BTreeMap::new());
        assert!(bytes.starts_with(b"%PDF"));
    }

    #[test]
    fn test_long_narrative_grows_document() {
        let short = render(BTreeMap::new());
        let long_text = "Delivery continues with careful coordination. ".repeat(400);
        let long = render(BTreeMap::from([("risks".to_string(), long_text)]));
        assert!(long.len() > short.len());
    }

    #[test]
    fn test_currency_and_hours_formatting() {
        assert_eq!(format_currency(1234567.891), "$1,234,567.89");
        assert_eq!(format_currency(0.0), "$0.00");
        assert_eq!(format_currency(-12.5), "-$12.50");
        assert_eq!(format_hours(1520.04), "1,520.0");
        assert_eq!(share(25.0, 100.0), "25.0%");
        assert_eq!(share(1.0, 0.0), "-");
    }

    #[test]
    fn test_wrap_text_respects_width() {
        let lines = wrap_text("alpha beta gamma delta epsilon", 11);
        assert_eq!(lines, vec!["alpha beta", "gamma delta", "epsilon"]);
        let split = wrap_text("abcdefghijklmnopqrst", 8);
        assert_eq!(split, vec!["abcdefgh", "ijklmnop", "qrst"]);
    }

    #[test]
    fn test_section_title_and_safe_text() {
        assert_eq!(section_title("executive_summary"), "Executive Summary");
        assert_eq!(pdf_safe("\u{201C}ok\u{201D} \u{2014} fine\u{2122}"), "\"ok\" - fine");
    }
}
