//! Pipeline scenarios run against in-process fakes and local SQLite files.

mod support;
