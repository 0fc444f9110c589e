//! Paginated report document.
//!
//! [`layout`] makes a single forward pass over a report, placing text runs
//! with a vertical cursor and breaking to a new page whenever the next block
//! would cross the usable height (page height minus the bottom margin).
//! [`PaginatedReport::to_pdf`] writes the placed runs out as a PDF 1.4 file.

use std::fmt::Write as _;

use super::DiagnosticReport;
use crate::suite::TestStatus;

pub const PDF_CREATOR: &str = "Pulse Diagnostics";
pub const PDF_TITLE: &str = "Diagnostic Report";
pub const REPORT_HEADING: &str = "Pulse Diagnostic Report";
pub const FOOTER_TEXT: &str = "Generated by Pulse Diagnostics";

// Vertical advance after each kind of line, in points.
const TITLE_ADVANCE: f64 = 40.0;
const SUBTITLE_ADVANCE: f64 = 30.0;
const HEADING_ADVANCE: f64 = 25.0;
const BODY_ADVANCE: f64 = 20.0;
const RESULT_ADVANCE: f64 = 18.0;
const SECTION_GAP: f64 = 20.0;

// Horizontal indents, relative to the left margin.
const BODY_INDENT: f64 = 20.0;
const REASON_INDENT: f64 = 40.0;

/// Page size and margins in points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub width: f64,
    pub height: f64,
    pub top_margin: f64,
    pub left_margin: f64,
    pub bottom_margin: f64,
}

impl Default for PageGeometry {
    /// US Letter.
    fn default() -> Self {
        Self {
            width: 8.5 * 72.0,
            height: 11.0 * 72.0,
            top_margin: 50.0,
            left_margin: 50.0,
            bottom_margin: 100.0,
        }
    }
}

impl PageGeometry {
    /// Lowest y any body line may reach.
    pub fn usable_bottom(&self) -> f64 {
        self.height - self.bottom_margin
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TextStyle {
    Title,
    Subtitle,
    Heading,
    Body,
    Result(TestStatus),
    Reason,
    Footer,
}

impl TextStyle {
    fn font_size(self) -> f64 {
        match self {
            TextStyle::Title => 24.0,
            TextStyle::Heading => 16.0,
            TextStyle::Subtitle | TextStyle::Body => 12.0,
            TextStyle::Result(_) => 11.0,
            TextStyle::Reason | TextStyle::Footer => 10.0,
        }
    }

    fn font_resource(self) -> &'static str {
        match self {
            TextStyle::Title | TextStyle::Heading => "F2",
            TextStyle::Reason => "F3",
            _ => "F1",
        }
    }

    fn color(self) -> (f64, f64, f64) {
        match self {
            TextStyle::Title | TextStyle::Heading | TextStyle::Body => (0.0, 0.0, 0.0),
            TextStyle::Subtitle => (0.5, 0.5, 0.5),
            TextStyle::Reason => (0.33, 0.33, 0.33),
            TextStyle::Footer => (0.67, 0.67, 0.67),
            TextStyle::Result(TestStatus::Passed) => (0.2, 0.78, 0.35),
            TextStyle::Result(TestStatus::Failed) => (1.0, 0.23, 0.19),
            TextStyle::Result(TestStatus::Skipped) => (1.0, 0.58, 0.0),
            TextStyle::Result(_) => (0.5, 0.5, 0.5),
        }
    }
}

/// One line of text placed on a page. `y` grows downward from the top edge.
#[derive(Debug, Clone, PartialEq)]
pub struct TextRun {
    pub x: f64,
    pub y: f64,
    pub line_height: f64,
    pub text: String,
    pub style: TextStyle,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub runs: Vec<TextRun>,
    pub footer: Option<TextRun>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaginatedReport {
    pub geometry: PageGeometry,
    pub pages: Vec<Page>,
}

struct Cursor {
    geometry: PageGeometry,
    pages: Vec<Page>,
    y: f64,
}

impl Cursor {
    fn new(geometry: PageGeometry) -> Self {
        Self {
            geometry,
            pages: vec![Page::default()],
            y: geometry.top_margin,
        }
    }

    fn page_is_empty(&self) -> bool {
        self.pages.last().map_or(true, |p| p.runs.is_empty())
    }

    fn new_page(&mut self) {
        self.pages.push(Page::default());
        self.y = self.geometry.top_margin;
    }

    /// Break before a block of `height` points that would cross the bottom
    /// bound. A block taller than a whole page still starts on a fresh one.
    fn ensure_room(&mut self, height: f64) {
        if self.y + height > self.geometry.usable_bottom() && !self.page_is_empty() {
            self.new_page();
        }
    }

    fn line(&mut self, indent: f64, advance: f64, text: impl Into<String>, style: TextStyle) {
        self.ensure_room(advance);
        let run = TextRun {
            x: self.geometry.left_margin + indent,
            y: self.y,
            line_height: advance,
            text: text.into(),
            style,
        };
        if let Some(page) = self.pages.last_mut() {
            page.runs.push(run);
        }
        self.y += advance;
    }

    fn gap(&mut self, height: f64) {
        self.y += height;
    }

    fn finish(mut self) -> Vec<Page> {
        let footer_y = self.geometry.height - self.geometry.top_margin;
        for page in &mut self.pages {
            page.footer = Some(TextRun {
                x: self.geometry.left_margin,
                y: footer_y,
                line_height: TextStyle::Footer.font_size(),
                text: FOOTER_TEXT.to_string(),
                style: TextStyle::Footer,
            });
        }
        self.pages
    }
}

/// Lay a report out onto pages.
pub fn layout(report: &DiagnosticReport, geometry: PageGeometry) -> PaginatedReport {
    let mut cursor = Cursor::new(geometry);
    let device = &report.device_info;
    let summary = report.summary();

    cursor.line(0.0, TITLE_ADVANCE, REPORT_HEADING, TextStyle::Title);
    cursor.line(
        0.0,
        SUBTITLE_ADVANCE,
        format!(
            "Generated: {}",
            report.timestamp.format("%B %-d, %Y at %-I:%M %p UTC")
        ),
        TextStyle::Subtitle,
    );

    cursor.line(0.0, HEADING_ADVANCE, "Device Information", TextStyle::Heading);
    let device_lines = [
        format!("Model: {}", device.model),
        format!("System: {} {}", device.system_name, device.system_version),
        format!("Device Name: {}", device.device_name),
        format!("Battery: {}", device.battery_summary()),
    ];
    for line in device_lines {
        cursor.line(BODY_INDENT, BODY_ADVANCE, line, TextStyle::Body);
    }
    cursor.gap(SECTION_GAP);

    cursor.line(0.0, HEADING_ADVANCE, "Test Summary", TextStyle::Heading);
    let summary_lines = [
        format!("Total Tests: {}", summary.total),
        format!("Passed: {}", summary.passed),
        format!("Failed: {}", summary.failed),
        format!("Skipped: {}", summary.skipped),
    ];
    for line in summary_lines {
        cursor.line(BODY_INDENT, BODY_ADVANCE, line, TextStyle::Body);
    }
    cursor.gap(SECTION_GAP);

    cursor.line(0.0, HEADING_ADVANCE, "Test Results", TextStyle::Heading);
    for result in &report.results {
        // A result and its reason stay together on one page.
        let block = if result.failure_reason.is_some() {
            RESULT_ADVANCE * 2.0
        } else {
            RESULT_ADVANCE
        };
        cursor.ensure_room(block);

        cursor.line(
            BODY_INDENT,
            RESULT_ADVANCE,
            format!("[{}] {}", result.status.label(), result.test_id),
            TextStyle::Result(result.status),
        );
        if let Some(reason) = &result.failure_reason {
            cursor.line(
                REASON_INDENT,
                RESULT_ADVANCE,
                format!("  \u{2192} {}", reason),
                TextStyle::Reason,
            );
        }
    }

    PaginatedReport {
        geometry,
        pages: cursor.finish(),
    }
}

impl PaginatedReport {
    /// Serialize to a PDF 1.4 document using the standard Helvetica fonts.
    pub fn to_pdf(&self) -> Vec<u8> {
        let page_count = self.pages.len();
        // 1 catalog, 2 page tree, 3-5 fonts, 6 info, then (page, content) pairs.
        let first_page_obj = 7;
        let mut objects: Vec<String> = Vec::with_capacity(6 + page_count * 2);

        objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
        let kids: Vec<String> = (0..page_count)
            .map(|i| format!("{} 0 R", first_page_obj + i * 2))
            .collect();
        objects.push(format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            kids.join(" "),
            page_count
        ));
        for base_font in ["Helvetica", "Helvetica-Bold", "Helvetica-Oblique"] {
            objects.push(format!(
                "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
                base_font
            ));
        }
        objects.push(format!(
            "<< /Creator ({}) /Title ({}) >>",
            escape_pdf_text(PDF_CREATOR),
            escape_pdf_text(PDF_TITLE)
        ));

        for (i, page) in self.pages.iter().enumerate() {
            let content_obj = first_page_obj + i * 2 + 1;
            objects.push(format!(
                "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
                 /Resources << /Font << /F1 3 0 R /F2 4 0 R /F3 5 0 R >> >> /Contents {} 0 R >>",
                fmt_num(self.geometry.width),
                fmt_num(self.geometry.height),
                content_obj
            ));
            let stream = self.content_stream(page);
            objects.push(format!(
                "<< /Length {} >>\nstream\n{}endstream",
                stream.len(),
                stream
            ));
        }

        let mut out = String::from("%PDF-1.4\n");
        let mut offsets = Vec::with_capacity(objects.len());
        for (i, body) in objects.iter().enumerate() {
            offsets.push(out.len());
            let _ = write!(out, "{} 0 obj\n{}\nendobj\n", i + 1, body);
        }

        let xref_offset = out.len();
        let _ = write!(out, "xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1);
        for offset in offsets {
            let _ = writeln!(out, "{:010} 00000 n ", offset);
        }
        let _ = write!(
            out,
            "trailer\n<< /Size {} /Root 1 0 R /Info 6 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_offset
        );

        out.into_bytes()
    }

    fn content_stream(&self, page: &Page) -> String {
        let mut stream = String::new();
        for run in page.runs.iter().chain(page.footer.iter()) {
            let size = run.style.font_size();
            let (r, g, b) = run.style.color();
            // PDF space has its origin at the bottom-left; place the baseline
            // one font size below the run's top edge.
            let baseline = self.geometry.height - run.y - size;
            let _ = writeln!(
                stream,
                "BT /{} {} Tf {} {} {} rg {} {} Td ({}) Tj ET",
                run.style.font_resource(),
                fmt_num(size),
                fmt_num(r),
                fmt_num(g),
                fmt_num(b),
                fmt_num(run.x),
                fmt_num(baseline),
                escape_pdf_text(&run.text)
            );
        }
        stream
    }
}

fn fmt_num(value: f64) -> String {
    let formatted = format!("{:.2}", value);
    formatted
        .trim_end_matches('0')
        .trim_end_matches('.')
        .to_string()
}

/// Escape a literal string for a content stream. Characters outside
/// printable ASCII are approximated since the fonts use WinAnsi.
fn escape_pdf_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '\u{2192}' => out.push_str("->"),
            ' '..='~' => out.push(ch),
            _ => out.push('?'),
        }
    }
    out
}
