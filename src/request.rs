//! The provider-neutral generation request
use crate::errors::GenerationError;
use std::borrow::Cow;

const DEFAULT_IMAGE_MIME: &str = "image/jpeg";

/// An image attached to a request, as sent by the chat UI.
///
/// Accepts either a data URL (`data:image/png;base64,...`) or a bare base64 payload, which is
/// assumed to be JPEG. Data URLs without the `;base64` marker are kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInput {
    mime_type: String,
    payload: String,
    /// The caller's URL, for data URLs whose payload is not base64.
    raw_url: Option<String>,
}

impl ImageInput {
    /// `Ok(None)` for an empty or whitespace-only input. A `data:` URL without a payload is an
    /// invalid request.
    pub fn parse(raw: &str) -> Result<Option<Self>, GenerationError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let Some(rest) = raw.strip_prefix("data:") else {
            return Ok(Some(Self {
                mime_type: DEFAULT_IMAGE_MIME.to_owned(),
                payload: raw.to_owned(),
                raw_url: None,
            }));
        };

        let (header, payload) = rest.split_once(',').ok_or_else(|| {
            GenerationError::InvalidRequest("image data URL has no payload".to_string())
        })?;
        if payload.trim().is_empty() {
            return Err(GenerationError::InvalidRequest(
                "image data URL has an empty payload".to_string(),
            ));
        }

        let mut params = header.split(';');
        let mime_type = match params.next().map(str::trim) {
            Some(mime) if !mime.is_empty() => mime,
            _ => DEFAULT_IMAGE_MIME,
        };
        let base64 = params.any(|p| p.trim().eq_ignore_ascii_case("base64"));

        Ok(Some(Self {
            mime_type: mime_type.to_owned(),
            payload: payload.to_owned(),
            raw_url: (!base64).then(|| raw.to_owned()),
        }))
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn is_base64(&self) -> bool {
        self.raw_url.is_none()
    }

    /// The base64 payload without any data URL header, if the image is base64 encoded.
    pub fn base64_payload(&self) -> Option<&str> {
        self.is_base64().then_some(self.payload.as_str())
    }

    pub fn data_url(&self) -> String {
        match &self.raw_url {
            Some(url) => url.clone(),
            None => format!("data:{};base64,{}", self.mime_type, self.payload),
        }
    }
}

/// One generation request as seen by a provider adapter. Built fresh for every call.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub user_prompt: String,
    pub system_prompt: String,
    pub image: Option<ImageInput>,
}

impl GenerationRequest {
    pub fn new(user_prompt: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            user_prompt: user_prompt.into(),
            system_prompt: system_prompt.into(),
            image: None,
        }
    }

    pub fn with_image(mut self, image: Option<ImageInput>) -> Self {
        self.image = image;
        self
    }

    pub fn is_vision(&self) -> bool {
        self.image.is_some()
    }

    /// The user prompt with a note appended, for adapters that have to drop the image.
    pub fn prompt_with_note(&self, note: &str) -> Cow<'_, str> {
        if self.image.is_some() {
            Cow::Owned(format!("{}\n\n{}", self.user_prompt, note))
        } else {
            Cow::Borrowed(&self.user_prompt)
        }
    }
}
