//! # Tether Remote
//!
//! The JSON:API source: maps operations onto HTTP requests, deserializes
//! response documents through the key map, and abstracts the transport
//! behind [`HttpClient`] so tests run against the in-process [`MockClient`].

pub mod client;
pub mod serializer;
pub mod source;
pub mod url;

pub use client::{HttpClient, HttpMethod, HttpRequest, HttpResponse, MockClient, ReqwestClient, MEDIA_TYPE};
pub use serializer::{
    JsonApiSerializer, PrimaryData, ResourceDocument, ResourceIdentifier, ResourceLinkage,
    ResourceObject, ResourceRelationship,
};
pub use source::{JsonApiConfig, JsonApiSource};
pub use url::{pluralize, singularize, UrlBuilder};
