//! Just enough of `multipart/form-data` to send one file and its text fields to storage.
use crate::backend::structs::FileUpload;
use bytes::{BufMut, Bytes, BytesMut};

pub fn content_type(boundary: &str) -> String {
    format!("multipart/form-data; boundary={}", boundary)
}

pub struct Form {
    boundary: String,
    body: BytesMut,
}

impl Form {
    pub fn new(boundary: &str) -> Self {
        Self {
            boundary: boundary.to_owned(),
            body: BytesMut::new(),
        }
    }

    pub fn text(mut self, name: &str, value: &str) -> Self {
        self.part_header(&format!(
            "Content-Disposition: form-data; name=\"{}\"\r\n",
            escape(name)
        ));
        self.body.put_slice(value.as_bytes());
        self.body.put_slice(b"\r\n");
        self
    }

    pub fn file(mut self, name: &str, upload: &FileUpload) -> Self {
        self.part_header(&format!(
            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n",
            escape(name),
            escape(&upload.name),
            upload.mime_type
        ));
        self.body.put_slice(&upload.bytes);
        self.body.put_slice(b"\r\n");
        self
    }

    pub fn finish(mut self) -> Bytes {
        self.body
            .put_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        self.body.freeze()
    }

    fn part_header(&mut self, headers: &str) {
        self.body
            .put_slice(format!("--{}\r\n{}\r\n", self.boundary, headers).as_bytes());
    }
}

// Quotes and line breaks would end the header early.
fn escape(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}
