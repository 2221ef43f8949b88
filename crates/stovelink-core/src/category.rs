//! Output routing tags.

use std::fmt;

/// Tag attached by a handler to route its `DATA` to per-category sinks.
///
/// Never used to match input commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Stat,
    Alls,
    Chrd,
    Cntr,
    Dprs,
    Fand,
    Hpar,
    Iopt,
    Labl,
    Mdve,
    Parm,
    Setp,
    Stdt,
    Time,
    Tmps,
    Powr,
    Sern,
    Adrd,
    Adwr,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Stat => "STAT",
            Category::Alls => "ALLS",
            Category::Chrd => "CHRD",
            Category::Cntr => "CNTR",
            Category::Dprs => "DPRS",
            Category::Fand => "FAND",
            Category::Hpar => "HPAR",
            Category::Iopt => "IOPT",
            Category::Labl => "LABL",
            Category::Mdve => "MDVE",
            Category::Parm => "PARM",
            Category::Setp => "SETP",
            Category::Stdt => "STDT",
            Category::Time => "TIME",
            Category::Tmps => "TMPS",
            Category::Powr => "POWR",
            Category::Sern => "SERN",
            Category::Adrd => "ADRD",
            Category::Adwr => "ADWR",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
