use crate::error::Error;

/// Digits in the run placeholder (`##`).
pub const RUN_WIDTH: usize = 2;
/// Digits in the sequential index placeholder (`#####`).
pub const INDEX_WIDTH: usize = 5;

/// Assumed when the template ends without an extension of its own.
const DEFAULT_EXTENSION: &str = ".tif";

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Run,
    Index,
}

/// Compiled form of a naming template such as `img_##_#####.tif`.
///
/// The template is parsed once at startup. `##` becomes a two digit run
/// capture and `#####` a five digit index capture; everything else must match
/// literally and the whole file name must be consumed.
#[derive(Debug, Clone)]
pub struct FilePattern {
    template: String,
    segments: Vec<Segment>,
}

impl FilePattern {
    pub fn parse(template: &str) -> Result<Self, Error> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '#' {
                literal.push(c);
                continue;
            }

            let mut width = 1;
            while chars.peek() == Some(&'#') {
                chars.next();
                width += 1;
            }

            let segment = match width {
                RUN_WIDTH => Segment::Run,
                INDEX_WIDTH => Segment::Index,
                _ => {
                    return Err(Error::Pattern(format!(
                        "'{}': placeholder of {} '#' is neither a run ({}) nor an index ({})",
                        template, width, RUN_WIDTH, INDEX_WIDTH
                    )))
                }
            };
            if segments.contains(&segment) {
                return Err(Error::Pattern(format!(
                    "'{}': placeholder of width {} appears more than once",
                    template, width
                )));
            }
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            segments.push(segment);
        }

        if !segments.contains(&Segment::Run) || !segments.contains(&Segment::Index) {
            return Err(Error::Pattern(format!(
                "'{}': expected both a run (##) and an index (#####) placeholder",
                template
            )));
        }

        if !literal.contains('.') {
            literal.push_str(DEFAULT_EXTENSION);
        }
        segments.push(Segment::Literal(literal));

        Ok(Self {
            template: template.to_string(),
            segments,
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Returns `(run, index)` when `file_name` matches the whole template.
    /// Index zero never matches since indices are 1-based.
    pub fn match_name(&self, file_name: &str) -> Option<(u32, u32)> {
        let mut rest = file_name;
        let mut run = None;
        let mut index = None;

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => rest = rest.strip_prefix(text.as_str())?,
                Segment::Run => {
                    let (value, tail) = take_digits(rest, RUN_WIDTH)?;
                    run = Some(value);
                    rest = tail;
                }
                Segment::Index => {
                    let (value, tail) = take_digits(rest, INDEX_WIDTH)?;
                    index = Some(value);
                    rest = tail;
                }
            }
        }

        if !rest.is_empty() {
            return None;
        }
        match (run, index) {
            (Some(run), Some(index)) if index > 0 => Some((run, index)),
            _ => None,
        }
    }
}

fn take_digits(input: &str, width: usize) -> Option<(u32, &str)> {
    let bytes = input.as_bytes();
    if bytes.len() < width || !bytes[..width].iter().all(u8::is_ascii_digit) {
        return None;
    }
    // ASCII digits, so `width` is a char boundary.
    let value = input[..width].parse().ok()?;
    Some((value, &input[width..]))
}

/// Smallest index of the set that `index` belongs to.
pub fn set_start(index: u32, set_size: u32) -> u32 {
    ((index - 1) / set_size) * set_size + 1
}
