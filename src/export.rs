//! Snapshot export: one self-contained HTML document with the rendered map
//! embedded as a base64 PNG. No external references, openable offline in
//! any browser. Writing the bytes to disk is the caller's business.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::RgbaImage;

use crate::classify::{ClassBreak, Method, Palette, CLASS_COUNT, NO_DATA_COLOR};
use crate::data::Region;
use crate::error::{MapError, Result};

/// Everything the document states about the view besides the raster itself
pub struct SnapshotMeta {
    pub region: Region,
    pub method: Method,
    pub palette: Palette,
    pub classes: [ClassBreak; CLASS_COUNT],
    /// Whether the legend needs the gray "No Data" row
    pub has_no_data: bool,
    /// Human-readable scale bar caption, e.g. "Scale bar: ~250 miles"
    pub scale_label: String,
}

/// Lossless PNG encoding of the raster
pub fn encode_png(raster: &RgbaImage) -> Result<Vec<u8>> {
    if raster.width() == 0 || raster.height() == 0 {
        return Err(MapError::EmptyInput("zero-size raster"));
    }
    let mut bytes = Vec::new();
    raster
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .map_err(|e| MapError::Encode(e.to_string()))?;
    Ok(bytes)
}

/// Produce the artifact bytes. Deterministic and side-effect-free.
pub fn export_html(raster: &RgbaImage, meta: &SnapshotMeta) -> Result<Vec<u8>> {
    let png = encode_png(raster)?;
    let encoded = BASE64.encode(&png);

    let region = meta.region.name();
    let method = meta.method.label();
    let palette = meta.palette.name();
    let legend = legend_rows(meta);
    let scale = &meta.scale_label;

    let html = format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <title>{region} Region Population Map</title>
    <meta charset="UTF-8">
    <style>
        body {{
            font-family: Arial, sans-serif;
            text-align: center;
            margin: 20px;
            background-color: #f5f5f5;
        }}
        .container {{
            max-width: 1200px;
            margin: 0 auto;
            background-color: white;
            padding: 20px;
            border-radius: 8px;
            box-shadow: 0 2px 4px rgba(0,0,0,0.1);
        }}
        h1 {{
            color: #2c3e50;
            margin-bottom: 10px;
        }}
        .info {{
            color: #7f8c8d;
            margin: 5px 0;
        }}
        img {{
            max-width: 100%;
            height: auto;
            margin: 20px 0;
            border: 1px solid #ddd;
            border-radius: 4px;
        }}
        table.legend {{
            margin: 0 auto;
            border-collapse: collapse;
            font-size: 13px;
        }}
        table.legend td {{
            padding: 3px 10px;
            text-align: left;
        }}
        td.swatch {{
            width: 40px;
            border: 1px solid #333;
        }}
        .footer {{
            margin-top: 20px;
            color: #95a5a6;
            font-size: 12px;
        }}
    </style>
</head>
<body>
    <div class="container">
        <h1>{region} Region Population Choropleth</h1>
        <p class="info">Classification Method: {method}</p>
        <p class="info">Color Scheme: {palette}</p>
        <img src="data:image/png;base64,{encoded}" alt="{region} Region Population Map">
        <table class="legend">
{legend}        </table>
        <p class="info">{scale}</p>
        <p class="footer">Generated by choropleth-tui</p>
    </div>
</body>
</html>
"#
    );

    Ok(html.into_bytes())
}

fn hex(color: (u8, u8, u8)) -> String {
    format!("#{:02x}{:02x}{:02x}", color.0, color.1, color.2)
}

fn legend_rows(meta: &SnapshotMeta) -> String {
    let mut rows = String::new();
    if meta.has_no_data {
        rows.push_str(&format!(
            "            <tr><td class=\"swatch\" style=\"background:{}\">&nbsp;</td><td>No Data</td></tr>\n",
            hex(NO_DATA_COLOR)
        ));
    }
    for (class, color) in meta.classes.iter().zip(meta.palette.colors()) {
        rows.push_str(&format!(
            "            <tr><td class=\"swatch\" style=\"background:{}\">&nbsp;</td><td>{} - {}</td></tr>\n",
            hex(color),
            with_commas(class.low),
            with_commas(class.high),
        ));
    }
    rows
}

/// Integer with thousands separators, shared with the legend sidebar
pub(crate) fn with_commas(value: f64) -> String {
    let n = value.round() as i64;
    let digits = n.abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if n < 0 {
        format!("-{out}")
    } else {
        out
    }
}
