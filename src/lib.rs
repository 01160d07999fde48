// src/lib.rs

//! Ticket Crawler Library
//!
//! Keeps a de-duplicated local store of civic-issue tickets up to date by
//! crawling a window of ids around the newest known ticket and merging the
//! results in, with every raw crawl archived as a compressed snapshot.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
