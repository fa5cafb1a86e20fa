use log::{debug, error, info};
use serde_json::{json, Map, Value};

use crate::chain::Chain;
use crate::chunk::ChunkStore;
use crate::constants::{EnvFlags, FREE_CHUNKS_TABLE};
use crate::env::DbOptions;
use crate::error::{Error, Result};
use crate::layout::{self, ChainKind};
use crate::markers::{Marker, MarkerBoard, MarkerKind};
use crate::medium::Medium;
use crate::meta::{self, FileMeta, RowRecord, TableMeta};
use crate::routes::RouteRegistry;
use crate::types::{ChunkType, Index, Response, NONE};

/// Record manager over one medium
///
/// Every public operation returns a [`Response`]; failures are mapped to
/// their status code once, at this boundary. All mutations of one database
/// must happen on one thread; see [`crate::Writer`] for handing operations
/// over from others.
pub struct Database<M> {
    /// Chunk I/O over the medium
    pub(crate) store: ChunkStore<M>,
    /// Settings fixed at open time
    pub(crate) options: DbOptions,
    /// Locator marker collaborator
    pub(crate) markers: Box<dyn MarkerBoard>,
    /// Read routes of the live files
    pub(crate) routes: RouteRegistry,
}

impl<M: Medium> Database<M> {
    /// Wrap an opened store, registering file routes unless disabled
    pub(crate) fn open(
        store: ChunkStore<M>,
        options: DbOptions,
        markers: Box<dyn MarkerBoard>,
    ) -> Result<Self> {
        let mut db = Database {
            store,
            options,
            markers,
            routes: RouteRegistry::new(),
        };

        if !db.options.flags.contains(EnvFlags::NOROUTES) {
            let registered = db.register_file_routes();
            info!("Registered {} file routes", registered);
        }
        Ok(db)
    }

    pub fn options(&self) -> &DbOptions {
        &self.options
    }

    pub fn markers(&self) -> &dyn MarkerBoard {
        self.markers.as_ref()
    }

    pub fn routes(&self) -> &RouteRegistry {
        &self.routes
    }

    pub fn store(&self) -> &ChunkStore<M> {
        &self.store
    }

    /// Raw access to the medium, bypassing every chain
    pub fn medium_mut(&mut self) -> &mut M {
        self.store.medium_mut()
    }

    /// Persist pending writes
    pub fn flush(&mut self) -> Result<()> {
        self.store.flush()
    }

    pub(crate) fn chain(&mut self, kind: ChainKind) -> Chain<'_, M> {
        Chain::new(&mut self.store, kind, self.options.limits)
    }

    /// Flush after a mutation unless NOSYNC is set
    pub(crate) fn sync(&mut self) -> Result<()> {
        if self.options.flags.contains(EnvFlags::NOSYNC) {
            return Ok(());
        }
        self.store.flush()
    }

    pub(crate) fn respond(&self, op: &str, result: Result<Response>) -> Response {
        match result {
            Ok(response) => response,
            Err(err) => {
                if err.is_corruption() {
                    error!("{} aborted, possible data corruption: {}", op, err);
                } else if err.status_code() >= 500 {
                    error!("{} failed: {}", op, err);
                } else {
                    debug!("{} rejected: {}", op, err);
                }
                Response::from(err)
            }
        }
    }

    /// Index and metadata of the table titled `title`
    pub(crate) fn find_table(&mut self, title: &str) -> Result<Option<(Index, TableMeta)>> {
        for entry in self.chain(ChainKind::Tables).cursor::<TableMeta>()? {
            let (index, meta) = entry?;
            if meta.title == title {
                return Ok(Some((index, meta)));
            }
        }
        Ok(None)
    }

    /// Logical index of the table titled `title`
    pub fn table_index(&mut self, title: &str) -> Result<Option<Index>> {
        Ok(self.find_table(title)?.map(|(index, _)| index))
    }

    fn require_table(&mut self, title: &str, missing: &str) -> Result<(Index, TableMeta)> {
        self.find_table(title)?
            .ok_or_else(|| Error::bad_request(missing.to_string()))
    }

    /// Row index for a caller supplied id, `None` past the valid range
    fn row_index(&self, id: i64) -> Result<Option<Index>> {
        if id < 1 {
            return Err(Error::bad_request(format!(
                "Row indexes are 1-based. Received id {}!",
                id
            )));
        }
        Ok(Index::try_from(id)
            .ok()
            .filter(|index| self.options.limits.in_range(*index)))
    }

    /// Append a table record under `index`
    pub(crate) fn create_table_at(&mut self, index: Index, title: &str) -> Result<()> {
        // a recycled table index must not inherit an old row chain
        self.store.delete_completely(layout::row_head(index))?;
        self.chain(ChainKind::Tables)
            .append(index, TableMeta::new(title))?;

        self.markers.place(Marker {
            position: layout::table_marker(index),
            kind: MarkerKind::Table,
            lines: vec![format!("Table: {}", title), format!("Index: {}", index)],
        });
        info!("Created table {} at index {}", title, index);
        Ok(())
    }

    /// Insert parsed row content into table `table`
    ///
    /// With `recycle` unset, or for the free-chunk table itself, the row
    /// index is always allocated sequentially.
    pub(crate) fn insert_content(
        &mut self,
        table: Index,
        title: &str,
        content: Map<String, Value>,
        recycle: bool,
    ) -> Result<(Index, String)> {
        let kind = ChainKind::Rows(table);
        let allocation = if recycle && title != FREE_CHUNKS_TABLE {
            self.allocate::<RowRecord>(kind)?
        } else {
            self.sequential::<RowRecord>(kind)?
        };

        let row = RowRecord::new(allocation.index, content);
        let json = row.content_json()?;
        if let Err(err) = self.chain(kind).append(allocation.index, row) {
            self.release(kind, allocation);
            return Err(err);
        }
        Ok((allocation.index, json))
    }

    /// Create an empty table
    pub fn create_table(&mut self, title: &str) -> Response {
        let result = self.try_create_table(title);
        self.respond("create_table", result)
    }

    fn try_create_table(&mut self, title: &str) -> Result<Response> {
        if title.is_empty() {
            return Err(Error::bad_request(
                "Body of request is length 0. Your table needs a title!",
            ));
        }
        if self.find_table(title)?.is_some() {
            return Err(Error::bad_request("A table with that name already exists!"));
        }

        let allocation = self.allocate::<TableMeta>(ChainKind::Tables)?;
        if let Err(err) = self.create_table_at(allocation.index, title) {
            self.release(ChainKind::Tables, allocation);
            return Err(err);
        }
        self.sync()?;
        Ok(Response::ok(format!("Wrote table {} successfully!", title)))
    }

    /// Insert one row; `content` must be a JSON object
    ///
    /// The row's `id` field is set to its logical index.
    pub fn insert_row(&mut self, table: &str, content: &str) -> Response {
        let result = self.try_insert_row(table, content);
        self.respond("insert_row", result)
    }

    fn try_insert_row(&mut self, table: &str, content: &str) -> Result<Response> {
        if content.trim().is_empty() {
            return Err(Error::bad_request(
                "Body of request is length 0. Your row needs content!",
            ));
        }
        if table.is_empty() {
            return Err(Error::bad_request(
                "Table title parameter is length 0. Your row needs a table to go to!",
            ));
        }
        let content = parse_object(content)?;
        let (index, _) = self.require_table(
            table,
            &format!("No table by the title of {} exists!", table),
        )?;

        let (_, json) = self.insert_content(index, table, content, true)?;
        self.sync()?;
        Ok(Response::ok_with(
            format!("Wrote row {} successfully!", json),
            json,
        ))
    }

    /// Content of one row
    pub fn read_row(&mut self, table: &str, id: i64) -> Response {
        let result = self.try_read_row(table, id);
        self.respond("read_row", result)
    }

    fn try_read_row(&mut self, table: &str, id: i64) -> Result<Response> {
        let row_index = self.row_index(id)?;
        if table.is_empty() {
            return Err(Error::bad_request("No table title provided!"));
        }
        let (index, _) =
            self.require_table(table, "Table doesn't exist or has corrupted metadata!")?;

        let row = match row_index {
            Some(row_index) => self
                .chain(ChainKind::Rows(index))
                .get::<RowRecord>(row_index)?,
            None => None,
        };
        let row = row.ok_or_else(|| {
            Error::bad_request("Row doesn't exist or has corrupted metadata!")
        })?;

        Ok(Response::ok_with(
            format!("Successfully read from index {} in {}!", id, table),
            row.content_json()?,
        ))
    }

    /// Contents of every row as a JSON array, in chain order
    pub fn read_table(&mut self, table: &str) -> Response {
        let result = self.try_read_table(table, None);
        self.respond("read_table", result)
    }

    /// Contents of the rows whose `key` field reads exactly `value`
    pub fn read_table_with_condition(&mut self, table: &str, key: &str, value: &str) -> Response {
        let result = self.try_read_table(table, Some((key, value)));
        self.respond("read_table_with_condition", result)
    }

    fn try_read_table(&mut self, table: &str, condition: Option<(&str, &str)>) -> Result<Response> {
        if table.is_empty() {
            return Err(Error::bad_request("No table title provided!"));
        }
        let (index, _) =
            self.require_table(table, "Table doesn't exist or has corrupted metadata!")?;

        let mut contents = Vec::new();
        for entry in self.chain(ChainKind::Rows(index)).cursor::<RowRecord>()? {
            let (_, row) = entry?;
            let matches = condition
                .map_or(true, |(key, value)| meta::meets_condition(&row.content, key, value));
            if matches {
                contents.push(row.content_json()?);
            }
        }

        let array = format!("[{}]", contents.join(","));
        let message = match condition {
            Some((key, value)) => format!("Successfully read rows where {} == {}", key, value),
            None => format!("Successfully read all rows from {}!", table),
        };
        Ok(Response::ok_with(message, array))
    }

    /// Replace the content of one row, keeping its place in the chain
    pub fn update_row(&mut self, table: &str, id: i64, content: &str) -> Response {
        let result = self.try_update_row(table, id, content);
        self.respond("update_row", result)
    }

    fn try_update_row(&mut self, table: &str, id: i64, content: &str) -> Result<Response> {
        if content.trim().is_empty() {
            return Err(Error::bad_request("No new data provided!"));
        }
        let row_index = self.row_index(id)?;
        let content = parse_object(content)?;
        let (index, _) =
            self.require_table(table, "Table doesn't exist or has corrupted metadata!")?;

        let missing = || Error::bad_request(format!("There is no id {} in table {}!", id, table));
        let row_index = row_index.ok_or_else(missing)?;
        let mut chain = self.chain(ChainKind::Rows(index));
        if chain.get::<RowRecord>(row_index)?.is_none() {
            return Err(missing());
        }
        chain.replace(row_index, RowRecord::new(row_index, content))?;

        self.sync()?;
        Ok(Response::ok(format!(
            "Successfully updated id {} in {}",
            id, table
        )))
    }

    /// Delete one row, recycling its index
    pub fn delete_row(&mut self, table: &str, id: i64) -> Response {
        let result = self.try_delete_row(table, id);
        self.respond("delete_row", result)
    }

    fn try_delete_row(&mut self, table: &str, id: i64) -> Result<Response> {
        let row_index = self.row_index(id)?;
        if table.is_empty() {
            return Err(Error::bad_request("No table name provided!"));
        }
        let (index, _) =
            self.require_table(table, "Table doesn't exist or has corrupted metadata!")?;

        let missing = || Error::bad_request("Row doesn't exist or has corrupted metadata!");
        let row_index = row_index.ok_or_else(missing)?;
        if self
            .chain(ChainKind::Rows(index))
            .get::<RowRecord>(row_index)?
            .is_none()
        {
            return Err(missing());
        }

        self.remove_row(index, row_index)?;
        self.sync()?;
        Ok(Response::ok("Deleted row from table with success!"))
    }

    /// Splice a row out and hand its index to the allocator
    fn remove_row(&mut self, table: Index, row: Index) -> Result<()> {
        self.chain(ChainKind::Rows(table))
            .splice_out::<RowRecord>(row)?;
        self.push_free(row, ChunkType::Row, table)
    }

    /// Delete a table with all of its rows
    pub fn delete_table(&mut self, title: &str) -> Response {
        let result = self.try_delete_table(title);
        self.respond("delete_table", result)
    }

    fn try_delete_table(&mut self, title: &str) -> Result<Response> {
        if title.is_empty() {
            return Err(Error::bad_request("Table title is empty!"));
        }
        if title == FREE_CHUNKS_TABLE {
            return Err(Error::bad_request(format!(
                "The {} table is reserved and cannot be deleted!",
                FREE_CHUNKS_TABLE
            )));
        }
        let (index, _) =
            self.require_table(title, &format!("No table with title {} exists!", title))?;

        // rows go first, while the owning table can still be looked up
        let rows_deleted = self.remove_rows_where(index, None)?;
        self.chain(ChainKind::Rows(index)).clear_head()?;

        self.chain(ChainKind::Tables)
            .splice_out::<TableMeta>(index)?;
        self.markers.remove(layout::table_marker(index));
        self.push_free(index, ChunkType::Table, NONE)?;

        self.sync()?;
        info!("Deleted table {} with {} rows", title, rows_deleted);
        Ok(Response::ok(format!(
            "Deleted table {} with success! Rows deleted: {}",
            title, rows_deleted
        )))
    }

    /// Delete every row of a table, keeping the table
    pub fn delete_all_from_table(&mut self, table: &str) -> Response {
        let result = self.try_delete_all(table, None);
        self.respond("delete_all_from_table", result)
    }

    /// Delete the rows whose `key` field reads exactly `value`
    pub fn delete_all_from_table_with_condition(
        &mut self,
        table: &str,
        key: &str,
        value: &str,
    ) -> Response {
        let result = self.try_delete_all(table, Some((key, value)));
        self.respond("delete_all_from_table_with_condition", result)
    }

    fn try_delete_all(&mut self, table: &str, condition: Option<(&str, &str)>) -> Result<Response> {
        let (index, _) =
            self.require_table(table, &format!("No table with title {} exists!", table))?;

        let rows_deleted = self.remove_rows_where(index, condition)?;
        self.sync()?;
        Ok(Response::ok(format!(
            "Successfully deleted all rows from {}! Rows deleted: {}",
            table, rows_deleted
        )))
    }

    /// Remove matching rows of table `table`, returning how many went
    fn remove_rows_where(&mut self, table: Index, condition: Option<(&str, &str)>) -> Result<usize> {
        let doomed: Vec<Index> = self
            .chain(ChainKind::Rows(table))
            .walk::<RowRecord>()?
            .into_iter()
            .filter(|(_, row)| {
                condition.map_or(true, |(key, value)| {
                    meta::meets_condition(&row.content, key, value)
                })
            })
            .map(|(index, _)| index)
            .collect();

        for row in &doomed {
            self.remove_row(table, *row)?;
        }
        Ok(doomed.len())
    }

    /// Store protection flags on a table
    ///
    /// The flag string is validated before anything is written.
    pub fn protect_table(&mut self, table: &str, flags: &str) -> Response {
        let result = self.try_protect_table(table, flags);
        self.respond("protect_table", result)
    }

    fn try_protect_table(&mut self, table: &str, flags: &str) -> Result<Response> {
        if table.is_empty() {
            return Err(Error::bad_request("Table title is empty!"));
        }
        if flags.is_empty() {
            return Err(Error::bad_request("Protection value is empty!"));
        }
        let parsed = meta::parse_protection(flags)?;
        let (index, mut table_meta) =
            self.require_table(table, "Table doesn't exist or has corrupted metadata!")?;

        table_meta.protection = Some(meta::render_protection(parsed));
        self.chain(ChainKind::Tables).replace(index, table_meta)?;
        self.sync()?;
        Ok(Response::ok("Successfully updated table protection rules"))
    }

    /// Drop any protection flags from a table
    pub fn remove_protections(&mut self, table: &str) -> Response {
        let result = self.try_remove_protections(table);
        self.respond("remove_protections", result)
    }

    fn try_remove_protections(&mut self, table: &str) -> Result<Response> {
        if table.is_empty() {
            return Err(Error::bad_request("Table title is empty!"));
        }
        let (index, mut table_meta) =
            self.require_table(table, "Table doesn't exist or has corrupted metadata!")?;

        table_meta.protection = None;
        self.chain(ChainKind::Tables).replace(index, table_meta)?;
        self.sync()?;
        Ok(Response::ok("Successfully updated table protection rules"))
    }

    /// Protection flags of a table, empty when it has none
    pub fn get_protection_flags(&mut self, table: &str) -> Response {
        let result = self.try_get_protection_flags(table);
        self.respond("get_protection_flags", result)
    }

    fn try_get_protection_flags(&mut self, table: &str) -> Result<Response> {
        if table.is_empty() {
            return Err(Error::bad_request("Table title is empty!"));
        }
        let (index, table_meta) =
            self.require_table(table, "Table doesn't exist or has corrupted metadata!")?;

        match table_meta.protection {
            None => Ok(Response::ok("")),
            Some(flags) => match meta::parse_protection(&flags) {
                Ok(_) => Ok(Response::ok(flags)),
                Err(_) => Err(Error::CorruptMetadata {
                    addr: layout::table_meta(index),
                    reason: format!("Protection flags on table {} are invalid: {}", table, flags),
                }),
            },
        }
    }

    /// Titles of every table as a JSON array, in chain order
    pub fn list_tables(&mut self) -> Response {
        let result = self.try_list_tables();
        self.respond("list_tables", result)
    }

    fn try_list_tables(&mut self) -> Result<Response> {
        let titles: Vec<String> = self
            .chain(ChainKind::Tables)
            .walk::<TableMeta>()?
            .into_iter()
            .map(|(_, table)| table.title)
            .collect();
        let count = titles.len();
        Ok(Response::ok_with(
            format!("Found {} tables", count),
            serde_json::to_string(&titles)?,
        ))
    }

    /// Walk every chain verifying links and row ids
    ///
    /// Reports a JSON summary; any corruption aborts the check with a 500.
    pub fn check_integrity(&mut self) -> Response {
        let result = self.try_check_integrity();
        self.respond("check_integrity", result)
    }

    fn try_check_integrity(&mut self) -> Result<Response> {
        let tables = self.chain(ChainKind::Tables).check::<TableMeta>()?;

        let mut rows = 0;
        let tables_walked = self.chain(ChainKind::Tables).walk::<TableMeta>()?;
        for (table, _) in tables_walked {
            let kind = ChainKind::Rows(table);
            rows += self.chain(kind).check::<RowRecord>()?.length;
            let live = self.chain(kind).walk::<RowRecord>()?;
            for (index, row) in live {
                if row.content.get("id") != Some(&Value::from(index)) {
                    return Err(Error::CorruptMetadata {
                        addr: kind.node(index),
                        reason: format!("row {} of table {} carries a different id", index, table),
                    });
                }
            }
        }

        let files = self.chain(ChainKind::Files).check::<FileMeta>()?;

        let summary = json!({
            "tables": tables.length,
            "rows": rows,
            "files": files.length,
            "routes": self.routes.len(),
        });
        Ok(Response::ok_with("Integrity check passed", summary.to_string()))
    }
}

/// Parse caller content as a JSON object
fn parse_object(content: &str) -> Result<Map<String, Value>> {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(Error::bad_request("Row content must be a JSON object!")),
        Err(e) => Err(Error::bad_request(format!(
            "Row content is not valid JSON: {}",
            e
        ))),
    }
}
