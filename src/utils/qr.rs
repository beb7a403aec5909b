use base64::{Engine as _, engine::general_purpose::STANDARD};
use qrcode::{EcLevel, QrCode, render::svg};

use crate::error::AppError;
use crate::utils::error_codes;

/// URL a scanner lands on for a laptop: `{app_url}/scan/{unique_id}`.
pub fn scan_url(app_url: &str, unique_id: &str) -> String {
    format!("{}/scan/{}", app_url.trim_end_matches('/'), unique_id)
}

pub fn render_svg(data: &str) -> Result<String, AppError> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::M).map_err(|e| {
        AppError::Internal {
            code: error_codes::SRV_QR_GENERATION_FAILED,
            operation: format!("encode QR code: {e}"),
        }
    })?;

    Ok(code
        .render::<svg::Color>()
        .min_dimensions(300, 300)
        .quiet_zone(true)
        .build())
}

/// Encodes `data` as a QR code and returns it as an inline `data:` URL.
pub fn encode_data_url(data: &str) -> Result<String, AppError> {
    let svg = render_svg(data)?;
    Ok(format!("data:image/svg+xml;base64,{}", STANDARD.encode(svg.as_bytes())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_url_ignores_trailing_slash() {
        assert_eq!(
            scan_url("https://laptops.example.com/", "LAP-0011223344556677"),
            "https://laptops.example.com/scan/LAP-0011223344556677"
        );
    }

    #[test]
    fn data_url_wraps_svg() {
        let url = encode_data_url("https://laptops.example.com/scan/LAP-0011223344556677").unwrap();
        let encoded = url.strip_prefix("data:image/svg+xml;base64,").unwrap();
        let svg = String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap();
        assert!(svg.contains("<svg"));
    }

    #[test]
    fn oversized_payload_is_an_internal_error() {
        let err = render_svg(&"x".repeat(8000)).unwrap_err();
        assert_eq!(err.code(), error_codes::SRV_QR_GENERATION_FAILED);
    }
}
