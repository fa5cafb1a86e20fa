use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{error, info, warn};
use serde_json::json;

use crate::database::Database;
use crate::error::{Error, Result};
use crate::layout::{self, ChainKind};
use crate::markers::{Marker, MarkerKind};
use crate::medium::Medium;
use crate::meta::FileMeta;
use crate::types::{ChunkType, Index, Response, Span};

/// A file read back from the medium
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    pub index: Index,
    pub title: String,
    pub mime: String,
    pub data: Vec<u8>,
}

/// Split an upload body of the form `title;mime;base64`
fn parse_upload(body: &str) -> Result<(&str, &str, Vec<u8>)> {
    let parts: Vec<&str> = body.split(';').collect();
    if parts.len() != 3 {
        return Err(Error::bad_request(format!(
            "Body of request should be {{fileTitle}};{{mime}};{{base64Data}}, received {} fields",
            parts.len()
        )));
    }
    let (title, mime, data) = (parts[0].trim(), parts[1].trim(), parts[2].trim());
    if title.is_empty() || mime.is_empty() {
        return Err(Error::bad_request("File title and mime type must not be empty!"));
    }
    let bytes = STANDARD
        .decode(data)
        .map_err(|e| Error::bad_request(format!("File data is not valid base64: {}", e)))?;
    Ok((title, mime, bytes))
}

/// Parse the single `q=<index>` or `id=<index>` parameter of a delete
fn parse_file_query(query: &str) -> Result<i64> {
    let query = query.trim_start_matches('?');
    let value = query
        .strip_prefix("q=")
        .or_else(|| query.strip_prefix("id="))
        .filter(|v| !v.contains('&'))
        .ok_or_else(|| Error::bad_request("Expected a single q or id parameter!"))?;
    value
        .parse::<i64>()
        .map_err(|_| Error::bad_request(format!("File index {} is not an integer!", value)))
}

impl<M: Medium> Database<M> {
    /// Walk the file chain once and register one read route per live file
    ///
    /// Stops at the first sign of corruption, keeping the routes already
    /// registered. Returns how many routes were added.
    pub fn register_file_routes(&mut self) -> usize {
        let files = match self.chain(ChainKind::Files).cursor::<FileMeta>() {
            Ok(cursor) => cursor.capped().collect::<Vec<_>>(),
            Err(err) => {
                error!("Cannot register file routes: {}", err);
                return 0;
            }
        };

        let mut registered = 0;
        for entry in files {
            match entry {
                Ok((index, file)) => match self.routes.register(&file.title, index) {
                    Ok(path) => {
                        info!("Created new route: {}", path);
                        registered += 1;
                    }
                    Err(err) => warn!("Skipping route of file {}: {}", index, err),
                },
                Err(err) => {
                    error!("File chain is corrupt, route registration stopped: {}", err);
                    break;
                }
            }
        }
        registered
    }

    /// Zero every chunk the payload of file `index` may occupy
    ///
    /// After the spanned run, a few more chunks are probed and cleared,
    /// stopping at the first one that is absent or already empty.
    fn erase_payload(&mut self, index: Index) -> Result<usize> {
        let start = layout::file_payload(index);
        let mut cleared = self.store.erase_span(start, Span::Forward)?;
        let span_end = cleared.max(1);

        for hop in 0..self.options.payload_probe {
            let addr = start.offset_x((span_end + hop) as i32);
            if self.store.is_empty(addr)? {
                break;
            }
            self.store.delete_completely(addr)?;
            cleared += 1;
        }
        Ok(cleared)
    }

    fn find_file(&mut self, title: &str) -> Result<Option<Index>> {
        for entry in self.chain(ChainKind::Files).cursor::<FileMeta>()? {
            let (index, file) = entry?;
            if file.title == title {
                return Ok(Some(index));
            }
        }
        Ok(None)
    }

    /// Store an uploaded file; `body` is `title;mime;base64data`
    ///
    /// The payload JSON carries the file's link, id and title.
    pub fn upload_file(&mut self, body: &str) -> Response {
        let result = self.try_upload_file(body);
        self.respond("upload_file", result)
    }

    fn try_upload_file(&mut self, body: &str) -> Result<Response> {
        let (title, mime, data) = parse_upload(body)?;
        if self.find_file(title)?.is_some() {
            return Err(Error::bad_request(format!(
                "A file with the title '{}' already exists!",
                title
            )));
        }

        let allocation = self.allocate::<FileMeta>(ChainKind::Files)?;
        let index = allocation.index;

        self.store.delete_completely(layout::file_meta(index))?;
        self.erase_payload(index)?;

        let written = self
            .store
            .write_bytes(layout::file_payload(index), &data, Span::Forward)
            .and_then(|()| {
                let file = FileMeta {
                    title: title.to_string(),
                    mime: mime.to_string(),
                    last_index: 0,
                    next_index: 0,
                };
                self.chain(ChainKind::Files).append(index, file)
            });
        if let Err(err) = written {
            self.erase_payload(index)?;
            self.release(ChainKind::Files, allocation);
            return Err(err);
        }

        let path = match self.routes.register(title, index) {
            Ok(path) => path,
            Err(err) => {
                self.chain(ChainKind::Files).splice_out::<FileMeta>(index)?;
                self.erase_payload(index)?;
                self.push_free(index, ChunkType::File, 0)?;
                return Err(err);
            }
        };

        self.markers.place(Marker {
            position: layout::file_marker(index),
            kind: MarkerKind::File,
            lines: vec![
                format!("File: {}", title),
                format!("Type: {}", mime),
                format!("Index: {}", index),
            ],
        });
        self.sync()?;
        info!("Stored file {} ({} bytes) at index {}", title, data.len(), index);

        let payload = json!({
            "message": format!("Wrote file {} successfully!", title),
            "link": format!("{}{}", self.options.base_url, path),
            "fileId": index,
            "title": title,
        });
        Ok(Response::ok_with(
            format!("Wrote file {} successfully!", title),
            payload.to_string(),
        ))
    }

    /// Delete a file named by a `q=<index>` or `id=<index>` query
    pub fn delete_file(&mut self, query: &str) -> Response {
        let result = parse_file_query(query).and_then(|id| {
            if id < 1 {
                return Err(Error::bad_request("File indexes are 1-based!"));
            }
            Index::try_from(id).map_err(|_| {
                Error::bad_request(format!("No file exists at index {}!", id))
            })
        });
        match result {
            Ok(index) => self.delete_file_by_index(index),
            Err(err) => self.respond("delete_file", Err(err)),
        }
    }

    /// Delete file `index`, erasing its payload and recycling the index
    pub fn delete_file_by_index(&mut self, index: Index) -> Response {
        let result = self.try_delete_file(index);
        self.respond("delete_file", result)
    }

    fn try_delete_file(&mut self, index: Index) -> Result<Response> {
        let file = match self.chain(ChainKind::Files).get::<FileMeta>(index) {
            Ok(Some(file)) => file,
            Ok(None) => {
                return Err(Error::bad_request(format!(
                    "No file exists at index {}!",
                    index
                )))
            }
            Err(err) if err.is_corruption() => {
                return Err(Error::bad_request(format!(
                    "File metadata at index {} is invalid: {}",
                    index, err
                )))
            }
            Err(err) => return Err(err),
        };

        self.chain(ChainKind::Files).splice_out::<FileMeta>(index)?;
        let cleared = self.erase_payload(index)?;
        self.routes.remove_index(index);
        self.markers.remove(layout::file_marker(index));
        self.push_free(index, ChunkType::File, 0)?;

        self.sync()?;
        info!(
            "Deleted file {} at index {} ({} payload chunks)",
            file.title, index, cleared
        );
        Ok(Response::ok(format!("Deleted file {} with success!", file.title)))
    }

    /// Title, mime type and bytes of file `index`
    pub fn read_file(&mut self, index: Index) -> Result<StoredFile> {
        let file = self
            .chain(ChainKind::Files)
            .get::<FileMeta>(index)?
            .ok_or_else(|| Error::bad_request(format!("No file exists at index {}!", index)))?;
        let data = self
            .store
            .read_bytes(layout::file_payload(index), Span::Forward)?;
        Ok(StoredFile {
            index,
            title: file.title,
            mime: file.mime,
            data,
        })
    }

    /// File served under a registered route path
    pub fn resolve_route(&mut self, path: &str) -> Result<Option<StoredFile>> {
        match self.routes.resolve(path) {
            Some(index) => self.read_file(index).map(Some),
            None => Ok(None),
        }
    }
}
