/*!
# Batchsheet

Upload CSV files as named batches, then browse, edit, reorder and export
them through an editable data grid.

## Overview

The heart of the crate is the grid engine. It keeps a working copy of a
batch's rows together with everything a table view layers on top: column
and global filters, a single sort key, pagination, column order and
visibility, row selection, the active cell with arrow-key navigation, and
the set of rows edited since the last save. The engine is synchronous and
never touches storage. It queues column reorders and saves as events that
a host hands to a persistence gateway.

## Architecture

### Grid Engine
- **view**: filter, sort and paginate over original row indices
- **navigation**: arrow-key moves between cells and pages
- **columns**: column order, visibility and drag-to-reorder
- **selection**: row selection keyed by original index
- **grid**: the engine tying these together

### Persistence
- **batch**: batch and row records
- **saving**: per-user batch databases, gzip-compressed bincode
- **gateway**: delivers grid events to storage and reports outcomes

### Import and Export
- **loader**: CSV parsing
- **wizard**: the upload, review and complete import flow
- **downloader**: CSV and XLSX export

### Hosts
- **login**: users, password hashing and cookie sessions
- **app**: HTTP API (feature `web`)
- **config**: server settings
- **wasm**: browser bindings (feature `wasm`)

The `batchsheet` binary is a command-line host; `batchsheet-server` runs the
HTTP API.
*/

pub mod batch;
pub mod columns;
pub mod config;
pub mod downloader;
pub mod gateway;
pub mod grid;
pub mod loader;
pub mod login;
pub mod navigation;
pub mod saving;
pub mod selection;
pub mod view;
pub mod wizard;

#[cfg(feature = "web")]
pub mod app;

#[cfg(feature = "wasm")]
pub mod wasm;
