use crate::types::Detection;
use failure::Fail;
use image::{DynamicImage, ImageOutputFormat};
use reqwest::blocking::{multipart, Client};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Fail)]
pub enum RecognizeError {
    #[fail(display = "unable to encode plate crop: {}", _0)]
    Encode(#[fail(cause)] image::ImageError),
    #[fail(display = "recognizer request failed: {}", _0)]
    Request(#[fail(cause)] reqwest::Error),
    #[fail(display = "recognizer returned status {}", _0)]
    Status(u16),
}

impl From<reqwest::Error> for RecognizeError {
    fn from(e: reqwest::Error) -> Self {
        RecognizeError::Request(e)
    }
}

/// Reads raw plate text from a pre-processed (grayscale) crop. An empty
/// string means nothing was read.
pub trait Recognizer: Send {
    fn recognize(
        &mut self,
        crop: &DynamicImage,
        detection: &Detection,
        budget: Duration,
    ) -> Result<String, RecognizeError>;
}

/// Uses the reading the detector reported with the plate box.
#[derive(Debug, Default)]
pub struct ReportedTextRecognizer;

impl Recognizer for ReportedTextRecognizer {
    fn recognize(
        &mut self,
        _crop: &DynamicImage,
        detection: &Detection,
        _budget: Duration,
    ) -> Result<String, RecognizeError> {
        Ok(detection.reading.clone().unwrap_or_default())
    }
}

#[derive(Debug, Deserialize)]
struct ReaderResponse {
    #[serde(default)]
    results: Vec<ReaderResult>,
}

#[derive(Debug, Deserialize)]
struct ReaderResult {
    plate: String,
}

/// Client for a Plate Recognizer style `plate-reader` endpoint.
pub struct HttpRecognizer {
    client: Client,
    url: String,
    token: Option<String>,
}

impl HttpRecognizer {
    pub fn new(url: String, token: Option<String>) -> Self {
        HttpRecognizer {
            client: Client::new(),
            url,
            token,
        }
    }
}

impl Recognizer for HttpRecognizer {
    fn recognize(
        &mut self,
        crop: &DynamicImage,
        _detection: &Detection,
        budget: Duration,
    ) -> Result<String, RecognizeError> {
        let mut png = Vec::new();
        crop.write_to(&mut png, ImageOutputFormat::Png)
            .map_err(RecognizeError::Encode)?;

        let part = multipart::Part::bytes(png).file_name("plate.png");
        let form = multipart::Form::new().part("upload", part);
        let mut request = self.client.post(&self.url).multipart(form).timeout(budget);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Token {}", token));
        }

        let response = request.send()?;
        if !response.status().is_success() {
            return Err(RecognizeError::Status(response.status().as_u16()));
        }
        let body: ReaderResponse = response.json()?;
        Ok(join_readings(&body))
    }
}

/// The reader may split one plate into several results; keep them in order.
fn join_readings(response: &ReaderResponse) -> String {
    response
        .results
        .iter()
        .map(|r| r.plate.as_str())
        .collect::<Vec<_>>()
        .concat()
        .replace(' ', "")
        .to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BoundingBox;
    use futures::StreamExt;
    use serde_json::json;
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Instant;
    use warp::http::StatusCode;
    use warp::filters::multipart::FormData;
    use warp::reply::{Json, WithStatus};
    use warp::Filter;

    fn plate_detection() -> Detection {
        Detection::new(BoundingBox::new(0.0, 0.0, 10.0, 5.0), 0, 0.8)
    }

    #[test]
    fn reported_text_is_passed_through() {
        let mut recognizer = ReportedTextRecognizer;
        let crop = DynamicImage::new_luma8(10, 5);
        let det = plate_detection().with_reading("mh12ab1234");
        assert_eq!(
            recognizer
                .recognize(&crop, &det, Duration::from_millis(10))
                .unwrap(),
            "mh12ab1234"
        );
        assert_eq!(
            recognizer
                .recognize(&crop, &plate_detection(), Duration::from_millis(10))
                .unwrap(),
            ""
        );
    }

    #[test]
    fn reader_fragments_are_joined() {
        let body: ReaderResponse = serde_json::from_str(
            r#"{"results": [{"plate": "mh 12", "score": 0.9}, {"plate": "ab1234"}], "processing_time": 80}"#,
        )
        .unwrap();
        assert_eq!(join_readings(&body), "MH12AB1234");
        let empty: ReaderResponse = serde_json::from_str(r#"{"results": []}"#).unwrap();
        assert_eq!(join_readings(&empty), "");
    }

    async fn reader_reply(authorization: Option<String>, mut form: FormData) -> WithStatus<Json> {
        if authorization.as_deref() != Some("Token secret") {
            return warp::reply::with_status(
                warp::reply::json(&json!({"detail": "Authentication credentials were not provided."})),
                StatusCode::UNAUTHORIZED,
            );
        }
        let mut upload = Vec::new();
        while let Some(Ok(part)) = form.next().await {
            if part.name() == "upload" {
                upload = crate::webhook::collect(part).await.unwrap_or_default();
            }
        }
        if image::load_from_memory(&upload).is_err() {
            return warp::reply::with_status(
                warp::reply::json(&json!({"upload": ["This field is required."]})),
                StatusCode::BAD_REQUEST,
            );
        }
        warp::reply::with_status(
            warp::reply::json(&json!({"results": [{"plate": "mh 12"}, {"plate": "ab1234"}]})),
            StatusCode::OK,
        )
    }

    /// Serves a stand-in plate reader on a background thread and returns its
    /// base URL.
    fn serve_reader() -> String {
        let (addr_tx, addr_rx) = mpsc::channel();
        thread::spawn(move || {
            let mut runtime = tokio::runtime::Runtime::new().unwrap();
            runtime.block_on(async move {
                let reader = warp::post()
                    .and(warp::path!("v1" / "plate-reader"))
                    .and(warp::header::optional::<String>("authorization"))
                    .and(warp::filters::multipart::form())
                    .and_then(|authorization, form| async move {
                        Ok::<_, warp::Rejection>(reader_reply(authorization, form).await)
                    });
                let down = warp::path!("down").map(|| {
                    warp::reply::with_status(warp::reply(), StatusCode::SERVICE_UNAVAILABLE)
                });
                let (addr, server) =
                    warp::serve(reader.or(down)).bind_ephemeral(([127, 0, 0, 1], 0));
                addr_tx.send(addr).unwrap();
                server.await;
            });
        });
        format!("http://{}", addr_rx.recv().unwrap())
    }

    fn crop() -> DynamicImage {
        DynamicImage::new_luma8(40, 12)
    }

    #[test]
    fn reader_response_is_joined() {
        let base = serve_reader();
        let mut recognizer = HttpRecognizer::new(
            format!("{}/v1/plate-reader", base),
            Some("secret".to_string()),
        );
        let text = recognizer
            .recognize(&crop(), &plate_detection(), Duration::from_secs(5))
            .unwrap();
        assert_eq!(text, "MH12AB1234");
    }

    #[test]
    fn rejected_token_is_a_status_error() {
        let base = serve_reader();
        let url = format!("{}/v1/plate-reader", base);

        let mut anonymous = HttpRecognizer::new(url.clone(), None);
        match anonymous.recognize(&crop(), &plate_detection(), Duration::from_secs(5)) {
            Err(RecognizeError::Status(401)) => {}
            other => panic!("unexpected result {:?}", other),
        }

        let mut wrong = HttpRecognizer::new(url, Some("guess".to_string()));
        match wrong.recognize(&crop(), &plate_detection(), Duration::from_secs(5)) {
            Err(RecognizeError::Status(401)) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn unavailable_reader_is_a_status_error() {
        let base = serve_reader();
        let mut recognizer =
            HttpRecognizer::new(format!("{}/down", base), Some("secret".to_string()));
        match recognizer.recognize(&crop(), &plate_detection(), Duration::from_secs(5)) {
            Err(RecognizeError::Status(503)) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }

    #[test]
    fn silent_reader_runs_out_of_budget() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/v1/plate-reader", listener.local_addr().unwrap());
        let mut recognizer = HttpRecognizer::new(url, None);

        let started = Instant::now();
        match recognizer.recognize(&crop(), &plate_detection(), Duration::from_millis(200)) {
            Err(RecognizeError::Request(_)) => {}
            other => panic!("unexpected result {:?}", other),
        }
        assert!(started.elapsed() < Duration::from_secs(5));
        drop(listener);
    }
}
