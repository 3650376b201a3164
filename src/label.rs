//! Printable quarantine-label rendering.

use crate::contracts::ReceivingRecord;

/// Escapes the characters that would break out of the label markup.
fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Renders the printable quarantine label for a stored record.
///
/// The analysis number is the dominant element; the red CUARENTENA banner
/// marks the material as held pending quality release.
pub fn render_label(record: &ReceivingRecord) -> String {
    format!(
        concat!(
            "<div style=\"border:5px solid black; padding:20px; background:white; ",
            "color:black; font-family:Arial; text-align:center; width:350px; margin:auto;\">\n",
            "  <h1 style=\"font-size:50px; margin:0;\">{analysis}</h1><hr>\n",
            "  <p><b>{description}</b></p>\n",
            "  <p>SKU: {sku} | Lote: {lot}</p>\n",
            "  <p>Proveedor: {supplier} | Recepción: {reception}</p>\n",
            "  <div style=\"background:red; color:white; font-size:40px; font-weight:bold; ",
            "padding:20px; border:2px solid black;\">CUARENTENA</div>\n",
            "  <button onclick=\"window.print()\" style=\"margin-top:20px; padding:15px; ",
            "width:100%; background:green; color:white; font-weight:bold; cursor:pointer;\">",
            "IMPRIMIR</button>\n",
            "</div>\n"
        ),
        analysis = escape_html(&record.analysis_number),
        description = escape_html(&record.description),
        sku = escape_html(&record.sku),
        lot = escape_html(&record.lot),
        supplier = escape_html(&record.supplier),
        reception = escape_html(&record.reception_number),
    )
}
