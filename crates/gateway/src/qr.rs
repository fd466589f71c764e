//! Pairing-code rendering: opaque code string → PNG data URL.

use std::io::Cursor;

use {
    base64::{Engine as _, engine::general_purpose::STANDARD},
    image::{DynamicImage, ImageFormat, Luma},
    qrcode::QrCode,
};

const MIN_IMAGE_DIMENSIONS: u32 = 300;

/// Render a pairing code as a `data:image/png;base64,...` URL suitable
/// for direct use in an `<img>` tag.
pub fn pairing_code_data_url(code: &str) -> anyhow::Result<String> {
    let qr = QrCode::new(code.as_bytes())?;
    let img = qr
        .render::<Luma<u8>>()
        .min_dimensions(MIN_IMAGE_DIMENSIONS, MIN_IMAGE_DIMENSIONS)
        .build();

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(img).write_to(&mut Cursor::new(&mut png), ImageFormat::Png)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
}
