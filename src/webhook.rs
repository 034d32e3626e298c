use crate::types::{BoundingBox, Detection, Frame};
use bytes::Buf;
use futures::StreamExt;
use image::io::Reader as ImageReader;
use image::DynamicImage;
use log::{debug, error, info, warn};
use serde_json::Value;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{SyncSender, TrySendError};
use std::sync::Arc;
use warp::Filter;

#[derive(Debug)]
struct HandleFrameError;

impl warp::reject::Reject for HandleFrameError {}

/// Class id reported for plate boxes.
pub const PLATE_CLASS: u32 = 0;

/// Accepts detector uploads on `POST /webhook` and queues them as frames.
pub async fn run(tx: SyncSender<Frame>, port: u16) {
    info!("Listening for detector uploads on port {}", port);
    warp::serve(routes(tx)).run(([0, 0, 0, 0], port)).await;
}

pub fn routes(
    tx: SyncSender<Frame>,
) -> impl Filter<Extract = impl warp::Reply, Error = warp::Rejection> + Clone {
    let counter = Arc::new(AtomicU64::new(0));
    warp::post()
        .and(warp::path!("webhook"))
        .and(warp::filters::multipart::form())
        .and(warp::any().map(move || (tx.clone(), counter.clone())))
        .and_then(|form, (tx, counter)| async move {
            let result = handle_upload(form, tx, counter).await;
            if let Err(e) = &result {
                error!("Error handling upload: {}", e);
            }
            result.map_err(|_| warp::reject::custom(HandleFrameError))
        })
}

async fn handle_upload(
    mut form: warp::filters::multipart::FormData,
    tx: SyncSender<Frame>,
    counter: Arc<AtomicU64>,
) -> Result<impl warp::Reply, failure::Error> {
    let mut json: Option<Value> = None;
    let mut image: Option<DynamicImage> = None;

    while let Some(part) = form.next().await {
        let part = part?;
        debug!("Got part {}", part.name());
        match part.name() {
            "json" => {
                let data = collect(part).await?;
                json = Some(serde_json::from_slice::<Value>(&data)?);
            }
            "upload" => {
                let data = collect(part).await?;
                image = match ImageReader::new(Cursor::new(data))
                    .with_guessed_format()
                    .map_err(failure::Error::from)
                    .and_then(|r| r.decode().map_err(failure::Error::from))
                {
                    Ok(i) => Some(i),
                    Err(e) => {
                        warn!("Failed to decode image: {}", e);
                        None
                    }
                };
            }
            _ => {
                warn!("Ignoring part {}", part.name());
            }
        }
    }

    let json = json.ok_or_else(|| format_err!("Missing JSON data"))?;
    let image = image.ok_or_else(|| format_err!("Missing or undecodable frame image"))?;
    let index = counter.fetch_add(1, Ordering::Relaxed);
    let frame = parse_frame(index, &json, image)?;

    info!(
        "Queueing frame {} with {} plate(s), {} vehicle(s)",
        index,
        frame.plates.len(),
        frame.vehicles.len()
    );
    match tx.try_send(frame) {
        Ok(()) => Ok(warp::reply()),
        Err(TrySendError::Full(_)) => Err(format_err!("Pipeline busy, dropping frame {}", index)),
        Err(TrySendError::Disconnected(_)) => Err(format_err!("Pipeline worker has stopped")),
    }
}

pub(crate) async fn collect(part: warp::filters::multipart::Part) -> Result<Vec<u8>, warp::Error> {
    let mut data: Vec<u8> = vec![];
    let mut stream = part.stream();
    while let Some(buf) = stream.next().await {
        data.extend_from_slice(buf?.bytes());
    }
    Ok(data)
}

/// Builds a frame from an ALPR detector payload: each result carries a plate
/// box with its reading and, optionally, the vehicle it was found on.
pub fn parse_frame(index: u64, json: &Value, image: DynamicImage) -> Result<Frame, failure::Error> {
    let results = json["data"]["results"]
        .as_array()
        .ok_or_else(|| format_err!("Missing results in JSON"))?;

    let mut plates = Vec::with_capacity(results.len());
    let mut vehicles = Vec::new();
    for result in results {
        let reading = result["plate"]
            .as_str()
            .ok_or_else(|| format_err!("Missing plate field"))?;
        let bbox = parse_box(&result["box"]).ok_or_else(|| format_err!("Missing plate box"))?;
        let score = result["score"].as_f64().unwrap_or(0.0) as f32;
        plates.push(Detection::new(bbox, PLATE_CLASS, score).with_reading(reading));

        let vehicle = &result["vehicle"];
        match (parse_box(&vehicle["box"]), vehicle["type"].as_str()) {
            (Some(bbox), Some(kind)) => {
                let score = vehicle["score"].as_f64().unwrap_or(0.0) as f32;
                match coco_class(kind) {
                    Some(class_id) => vehicles.push(Detection::new(bbox, class_id, score)),
                    None => debug!("Ignoring vehicle of unknown type {}", kind),
                }
            }
            _ => debug!("No vehicle for plate {}", reading),
        }
    }

    Ok(Frame {
        index,
        image,
        vehicles,
        plates,
    })
}

fn parse_box(value: &Value) -> Option<BoundingBox> {
    let coord = |k: &str| value[k].as_f64().map(|v| v as f32);
    Some(BoundingBox::new(
        coord("xmin")?,
        coord("ymin")?,
        coord("xmax")?,
        coord("ymax")?,
    ))
}

/// Maps an ALPR vehicle type onto the COCO class ids used for filtering.
pub fn coco_class(kind: &str) -> Option<u32> {
    match kind.to_ascii_lowercase().as_str() {
        "sedan" | "suv" | "van" | "pickup" | "car" => Some(2),
        "motorcycle" | "motorbike" => Some(3),
        "bus" => Some(5),
        "big truck" | "truck" => Some(7),
        _ => None,
    }
}
