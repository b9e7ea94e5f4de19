// HTTP adapters for the external services the pipeline depends on. Each
// implements one of the capability traits in `types` / `storage` so the
// transformation logic never sees a network client directly.

pub mod bi_http;
pub mod kaggle;
pub mod object_http;
pub mod query_http;

pub use bi_http::HttpExtractPublisher;
pub use kaggle::KaggleProvider;
pub use object_http::HttpObjectStore;
pub use query_http::HttpQueryService;
