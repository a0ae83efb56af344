//! Integration tests for drivemirror-gdrive
//!
//! Uses wiremock to simulate the Drive v3 and OAuth token endpoints and
//! verifies end-to-end behavior of listing, resumable uploads, downloads,
//! deletes and token refresh.

mod common;

mod test_auth_refresh;
mod test_download_delete;
mod test_listing;
