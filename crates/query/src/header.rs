//! Logical shape of a row stream.

use std::fmt;

/// Column name used for fields removed by a projection.
pub const DELETED: &str = "-";

/// Describes the rows an operator produces.
///
/// `flds` holds one group of field names per record of a `Row`, in the same
/// order. Groups alternate between key/placeholder records (even positions) and
/// real data records (odd positions). `cols` is the logical column list, which
/// may include rule columns that no group carries.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Header {
    flds: Vec<Vec<String>>,
    cols: Vec<String>,
}

impl Header {
    /// Creates a header from field groups and logical columns.
    pub fn new(flds: Vec<Vec<String>>, cols: Vec<String>) -> Self {
        Self { flds, cols }
    }

    /// Header of a stored table: an empty key group and one data group.
    pub fn table(columns: &[String]) -> Self {
        Self::new(vec![Vec::new(), columns.to_vec()], columns.to_vec())
    }

    /// Returns the field groups.
    #[inline]
    pub fn groups(&self) -> &[Vec<String>] {
        &self.flds
    }

    /// Returns the number of field groups, i.e. records per row.
    #[inline]
    pub fn size(&self) -> usize {
        self.flds.len()
    }

    /// Returns the physical fields, taken from the data groups.
    pub fn fields(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for group in self.flds.iter().skip(1).step_by(2) {
            for f in group {
                if f != DELETED && !out.contains(f) {
                    out.push(f.clone());
                }
            }
        }
        out
    }

    /// Returns the logical columns, excluding deleted placeholders.
    pub fn columns(&self) -> Vec<String> {
        self.cols.iter().filter(|c| *c != DELETED).cloned().collect()
    }

    /// Returns the rule columns: logical columns with no physical field.
    pub fn rules(&self) -> Vec<String> {
        let fields = self.fields();
        self.columns()
            .into_iter()
            .filter(|c| !fields.contains(c))
            .collect()
    }

    /// Returns true if the header has the logical column.
    pub fn has_column(&self, col: &str) -> bool {
        self.cols.iter().any(|c| c == col)
    }

    /// Locates every `(group, position)` holding the field.
    pub(crate) fn find<'a>(&'a self, col: &'a str) -> impl Iterator<Item = (usize, usize)> + 'a {
        self.flds.iter().enumerate().filter_map(move |(g, group)| {
            group.iter().position(|f| f == col).map(|p| (g, p))
        })
    }

    /// Keeps only `fields`; other field names become placeholders so record
    /// positions stay valid.
    pub fn project(&self, fields: &[String]) -> Header {
        let flds = self
            .flds
            .iter()
            .map(|group| {
                group
                    .iter()
                    .map(|f| {
                        if fields.contains(f) {
                            f.clone()
                        } else {
                            DELETED.to_string()
                        }
                    })
                    .collect()
            })
            .collect();
        Header::new(flds, fields.to_vec())
    }

    /// Renames fields and columns from `from[i]` to `to[i]`.
    pub fn rename(&self, from: &[String], to: &[String]) -> Header {
        let map = |f: &String| match from.iter().position(|x| x == f) {
            Some(i) => to[i].clone(),
            None => f.clone(),
        };
        let flds = self
            .flds
            .iter()
            .map(|group| group.iter().map(map).collect())
            .collect();
        let cols = self.cols.iter().map(map).collect();
        Header::new(flds, cols)
    }

    /// Concatenates two headers, as for rows built from two sources.
    pub fn concat(&self, other: &Header, cols: Vec<String>) -> Header {
        let mut flds = self.flds.clone();
        flds.extend(other.flds.iter().cloned());
        Header::new(flds, cols)
    }

    /// Appends a record group for extended fields plus extra rule columns.
    pub fn extend(&self, fields: Vec<String>, rules: &[String]) -> Header {
        let mut flds = self.flds.clone();
        let mut cols = self.cols.clone();
        cols.extend(fields.iter().cloned());
        cols.extend(rules.iter().cloned());
        flds.push(Vec::new());
        flds.push(fields);
        Header::new(flds, cols)
    }
}

impl fmt::Display for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let groups: Vec<String> = self
            .flds
            .iter()
            .map(|g| format!("({})", g.join(",")))
            .collect();
        write!(f, "{} [{}]", groups.join(" "), self.cols.join(","))
    }
}
