//! Test helper utilities for E2E testing

use image::{DynamicImage, Rgba, RgbaImage};
use reqwest::multipart;
use std::io::Cursor;

use inventory_enrich::models::job::CreateJobResponse;
use inventory_enrich::models::object::CandidateObject;

/// Submit a photo and its candidate objects to the enrichment endpoint.
pub async fn submit_photo(
    client: &reqwest::Client,
    base_url: &str,
    image_bytes: Vec<u8>,
    objects: &[CandidateObject],
) -> Result<CreateJobResponse, Box<dyn std::error::Error + Send + Sync>> {
    let form = multipart::Form::new()
        .part(
            "image",
            multipart::Part::bytes(image_bytes)
                .file_name("photo.png")
                .mime_str("image/png")?,
        )
        .text("objects", serde_json::to_string(objects)?);

    let response = client
        .post(format!("{base_url}/api/v1/enrich"))
        .multipart(form)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await?;
        return Err(format!("submit failed with status {status}: {error_text}").into());
    }

    Ok(response.json::<CreateJobResponse>().await?)
}

/// A synthetic room photo: three colored blocks on a neutral background,
/// one per sample candidate, so the localization service has something to
/// find.
pub fn sample_photo_png() -> Vec<u8> {
    let mut img = RgbaImage::from_pixel(640, 480, Rgba([230, 228, 222, 255]));
    let blocks: [(u32, u32, Rgba<u8>); 3] = [
        (60, 300, Rgba([180, 60, 40, 255])),   // mug
        (280, 120, Rgba([240, 200, 90, 255])), // lamp
        (460, 260, Rgba([80, 90, 130, 255])),  // chair
    ];
    for (left, top, color) in blocks {
        for y in top..(top + 120).min(480) {
            for x in left..(left + 120).min(640) {
                img.put_pixel(x, y, color);
            }
        }
    }

    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .expect("failed to encode sample photo");
    bytes
}

pub fn sample_candidates() -> Vec<CandidateObject> {
    vec![
        CandidateObject {
            name: "Mug".to_string(),
            category: "Kitchenware".to_string(),
            description: "Red ceramic mug".to_string(),
            estimated_cost_usd: 12.0,
        },
        CandidateObject {
            name: "Lamp".to_string(),
            category: "Lighting".to_string(),
            description: "Yellow desk lamp".to_string(),
            estimated_cost_usd: 45.0,
        },
        CandidateObject {
            name: "Chair".to_string(),
            category: "Furniture".to_string(),
            description: "Blue accent chair".to_string(),
            estimated_cost_usd: 180.0,
        },
    ]
}
