//! Minimal PDF 1.4 writer for invoices.
//!
//! Produces text-only pages in the built-in Helvetica font. Content is
//! restricted to printable ASCII; other characters are replaced with `?`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

const PAGE_WIDTH: u32 = 595;
const PAGE_HEIGHT: u32 = 842;
const MARGIN_LEFT: u32 = 50;
const TOP: u32 = 790;
const LINE_HEIGHT: u32 = 16;
const LINES_PER_PAGE: usize = 44;

#[derive(Debug, Clone)]
pub struct InvoiceLine {
    pub description: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Clone)]
pub struct InvoiceDocument {
    pub invoice_number: String,
    pub po_number: String,
    pub issued_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub company_name: String,
    pub company_address: Option<String>,
    pub vessel_name: String,
    pub currency: String,
    pub lines: Vec<InvoiceLine>,
    pub subtotal: Decimal,
    pub markup_rate: Decimal,
    pub markup_amount: Decimal,
    pub total: Decimal,
}

impl InvoiceDocument {
    fn text_lines(&self) -> Vec<(u8, String)> {
        let mut out: Vec<(u8, String)> = vec![
            (18, "SMS - Smart Maintenance System".into()),
            (14, format!("INVOICE {}", self.invoice_number)),
            (10, String::new()),
            (10, format!("Issued: {}", self.issued_at.format("%Y-%m-%d"))),
            (10, format!("Due:    {}", self.due_at.format("%Y-%m-%d"))),
            (10, format!("Purchase order: {}", self.po_number)),
            (10, String::new()),
            (12, "Bill to".into()),
            (10, self.company_name.clone()),
        ];
        if let Some(address) = &self.company_address {
            out.push((10, address.clone()));
        }
        out.push((10, format!("Vessel: {}", self.vessel_name)));
        out.push((10, String::new()));
        out.push((
            10,
            format!(
                "{:<48} {:>6} {:>12} {:>12}",
                "Description", "Qty", "Unit", "Amount"
            ),
        ));
        for line in &self.lines {
            out.push((
                10,
                format!(
                    "{:<48} {:>6} {:>12} {:>12}",
                    truncate(&line.description, 48),
                    line.quantity,
                    line.unit_price.round_dp(2),
                    line.line_total.round_dp(2)
                ),
            ));
        }
        out.push((10, String::new()));
        out.push((
            10,
            format!("{:<68} {:>12}", "Subtotal", self.subtotal.round_dp(2)),
        ));
        out.push((
            10,
            format!(
                "{:<68} {:>12}",
                format!(
                    "Service fee ({}%)",
                    (self.markup_rate * Decimal::from(100)).normalize()
                ),
                self.markup_amount.round_dp(2)
            ),
        ));
        out.push((
            12,
            format!(
                "{:<58} {:>10} {:>12}",
                "Total due",
                self.currency,
                self.total.round_dp(2)
            ),
        ));
        out
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut t: String = s.chars().take(max - 3).collect();
        t.push_str("...");
        t
    }
}

/// Escapes a string for a PDF literal
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(c);
            }
            ' '..='~' => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

fn content_stream(lines: &[(u8, String)]) -> String {
    let mut stream = String::from("BT\n");
    let mut y = TOP;
    for (size, text) in lines {
        // Courier keeps the table columns aligned
        let font = if *size > 10 { "F1" } else { "F2" };
        stream.push_str(&format!(
            "/{} {} Tf 1 0 0 1 {} {} Tm ({}) Tj\n",
            font,
            size,
            MARGIN_LEFT,
            y,
            escape(text)
        ));
        y = y.saturating_sub(LINE_HEIGHT + u32::from(size.saturating_sub(10)));
    }
    stream.push_str("ET\n");
    stream
}

/// Renders the invoice into PDF bytes
pub fn render_invoice_pdf(doc: &InvoiceDocument) -> Vec<u8> {
    let lines = doc.text_lines();
    let pages: Vec<&[(u8, String)]> = lines.chunks(LINES_PER_PAGE).collect();

    // Object layout: 1 catalog, 2 pages, 3 Helvetica-Bold, 4 Courier,
    // then (page, contents) pairs.
    let page_ids: Vec<usize> = (0..pages.len()).map(|i| 5 + i * 2).collect();
    let mut objects: Vec<String> = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!(
            "<< /Type /Pages /Kids [{}] /Count {} >>",
            page_ids
                .iter()
                .map(|id| format!("{} 0 R", id))
                .collect::<Vec<_>>()
                .join(" "),
            pages.len()
        ),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica-Bold >>".to_string(),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Courier >>".to_string(),
    ];
    for (i, page_lines) in pages.iter().enumerate() {
        let contents_id = page_ids[i] + 1;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {} {}] \
             /Resources << /Font << /F1 3 0 R /F2 4 0 R >> >> /Contents {} 0 R >>",
            PAGE_WIDTH, PAGE_HEIGHT, contents_id
        ));
        let stream = content_stream(page_lines);
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}endstream",
            stream.len(),
            stream
        ));
    }

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }
    let xref_offset = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        pdf.push_str(&format!("{:010} 00000 n \n", offset));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_offset
    ));
    pdf.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn document(lines: usize) -> InvoiceDocument {
        InvoiceDocument {
            invoice_number: "INV-2024-000001".into(),
            po_number: "PO-20240601-AB12CD".into(),
            issued_at: Utc::now(),
            due_at: Utc::now(),
            company_name: "Northern Shipping (Oslo)".into(),
            company_address: None,
            vessel_name: "MV Aurora".into(),
            currency: "USD".into(),
            lines: (0..lines)
                .map(|i| InvoiceLine {
                    description: format!("Impeller kit #{}", i),
                    quantity: 2,
                    unit_price: dec!(50.00),
                    line_total: dec!(100.00),
                })
                .collect(),
            subtotal: dec!(100.00),
            markup_rate: dec!(0.20),
            markup_amount: dec!(20.00),
            total: dec!(120.00),
        }
    }

    #[test]
    fn renders_well_formed_pdf() {
        let bytes = render_invoice_pdf(&document(1));
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("%PDF-1.4"));
        assert!(text.trim_end().ends_with("%%EOF"));
        assert!(text.contains("INVOICE INV-2024-000001"));
        assert!(text.contains("Service fee \\(20%\\)"));
        assert!(text.contains("Northern Shipping \\(Oslo\\)"));

        // startxref points at the xref table
        let start: usize = text
            .lines()
            .skip_while(|l| *l != "startxref")
            .nth(1)
            .unwrap()
            .parse()
            .unwrap();
        assert!(text[start..].starts_with("xref"));
    }

    #[test]
    fn long_invoices_span_pages() {
        let text = String::from_utf8(render_invoice_pdf(&document(80))).unwrap();
        assert!(text.contains("/Count 3"));
    }

    #[test]
    fn escape_replaces_non_ascii() {
        assert_eq!(escape("Tromsø (N)"), "Troms? \\(N\\)");
    }
}
