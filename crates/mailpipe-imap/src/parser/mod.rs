//! IMAP protocol parser.
//!
//! A sans-I/O parser for server responses. It is split into:
//!
//! - **Lexer**: tokenizes raw bytes (atoms, strings, literals, numbers)
//! - **Response parser**: builds [`Response`] values from tokens
//! - **Records**: extracts typed results from a command's untagged payload
//!
//! # Example
//!
//! ```
//! use mailpipe_imap::parser::{Response, ResponseParser, UntaggedResponse};
//!
//! let response = ResponseParser::parse(b"* 3 EXISTS\r\n").unwrap();
//! assert_eq!(response, Response::Untagged(UntaggedResponse::Exists(3)));
//! ```

pub mod date;
pub mod encoded_word;
pub mod lexer;
pub mod records;
pub mod response;

pub use lexer::{Lexer, Token};
pub use records::FetchRecord;
pub use response::{
    Address, ESearch, Envelope, FetchItem, Response, ResponseParser, UntaggedResponse,
};
