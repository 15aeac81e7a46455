pub mod html_parser;

pub use html_parser::{
    is_careers_path, is_contact_or_about_path, PageParser, ParsedPage,
};
