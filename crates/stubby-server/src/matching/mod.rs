//! Request matching engine.
//!
//! A stubbed request is compared against an incoming (asserting) request
//! field by field. Every comparison bottoms out in the [`ValueMatcher`],
//! which decides between literal equality and a regex match.
//!
//! # Module Structure
//!
//! - `value` - Single value comparison with regex capture recording
//! - `body` - Content-type aware body comparison (JSON, XML, text)
//! - `xml` - Semantic XML diff with placeholder evaluation
//! - `request` - Field-ordered request comparison and map matching

mod body;
mod request;
mod value;
mod xml;

#[allow(unused_imports)]
pub use body::{content_subtype, BodyMatcher};
#[allow(unused_imports)]
pub use request::{lists_intersect, RequestMatcher};
#[allow(unused_imports)]
pub use value::{build_token, is_set, potential_regex, RegexGroups, ValueMatcher};
#[allow(unused_imports)]
pub use xml::{xml_match, XmlMatchError};
