//! Terminal rendering of pairing QR codes.

use qrcode::{Color, EcLevel, QrCode};
use wabridge_core::error::BridgeError;

/// Render a QR code for terminal display using Unicode half-block characters.
///
/// Two module rows share one text line (`▀`, `▄`, `█`, space), which keeps
/// the code roughly square in a terminal font.
pub fn generate_qr_terminal(qr_data: &str) -> Result<String, BridgeError> {
    let code = QrCode::with_error_correction_level(qr_data.as_bytes(), EcLevel::L)
        .map_err(|e| BridgeError::Client(format!("QR generation failed: {e}")))?;

    let width = code.width();
    let colors = code.into_colors();
    let dark = |row: usize, col: usize| row < width && colors[row * width + col] == Color::Dark;

    let mut out = String::with_capacity((width + 1) * width.div_ceil(2));
    for row in (0..width).step_by(2) {
        for col in 0..width {
            out.push(match (dark(row, col), dark(row + 1, col)) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                (false, false) => ' ',
            });
        }
        out.push('\n');
    }

    Ok(out)
}
