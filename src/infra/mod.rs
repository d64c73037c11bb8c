pub mod checkpoint_file;
pub mod http_client;
pub mod page_parser;

pub use checkpoint_file::FileCheckpoint;
pub use http_client::ReqwestHttp;
pub use page_parser::HtmlPageParser;
