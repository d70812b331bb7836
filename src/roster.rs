use std::fmt;
use std::path::PathBuf;

/// Roster generation the student belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cohort {
    M1,
    M2,
}

impl Cohort {
    pub const ALL: [Cohort; 2] = [Cohort::M1, Cohort::M2];

    pub fn as_str(&self) -> &'static str {
        match self {
            Cohort::M1 => "M1",
            Cohort::M2 => "M2",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "M1" => Some(Cohort::M1),
            "M2" => Some(Cohort::M2),
            _ => None,
        }
    }

    fn file_stem(&self) -> &'static str {
        match self {
            Cohort::M1 => "m1",
            Cohort::M2 => "m2",
        }
    }
}

impl fmt::Display for Cohort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enrollment mode. Lookups always check Initial before Apprentice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Track {
    Initial,
    Apprentice,
}

impl Track {
    pub const ALL: [Track; 2] = [Track::Initial, Track::Apprentice];

    pub fn as_str(&self) -> &'static str {
        match self {
            Track::Initial => "initial",
            Track::Apprentice => "apprentice",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "initial" => Some(Track::Initial),
            "apprentice" => Some(Track::Apprentice),
            _ => None,
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One roster entry. Loaded from the enrollment exports at lookup time and
/// never written back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRecord {
    pub student_id: String,
    pub given_name: String,
    pub family_name: String,
    pub email: String,
    pub cohort: Cohort,
    pub track: Track,
}

/// Read-only view over the enrollment export files, one `;`-separated file
/// per cohort and track (`<dir>/m1_initial.csv`, ...). Rows are
/// `student_id;family_name;given_name`.
pub struct Roster {
    dir: PathBuf,
    email_domain: String,
}

impl Roster {
    pub fn new(dir: impl Into<PathBuf>, email_domain: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            email_domain: email_domain.into(),
        }
    }

    /// Exact-match lookup, scanning Initial then Apprentice within each
    /// cohort (all cohorts when none is given).
    pub fn find_by_id(&self, student_id: &str, cohort: Option<Cohort>) -> Option<IdentityRecord> {
        let cohorts: &[Cohort] = match cohort {
            Some(ref c) => std::slice::from_ref(c),
            None => &Cohort::ALL,
        };

        for &cohort in cohorts {
            for track in Track::ALL {
                if let Some(record) = self
                    .load_source(cohort, track)
                    .into_iter()
                    .find(|r| r.student_id == student_id)
                {
                    return Some(record);
                }
            }
        }
        None
    }

    pub fn list_all(&self, cohort: Option<Cohort>) -> Vec<IdentityRecord> {
        let cohorts: &[Cohort] = match cohort {
            Some(ref c) => std::slice::from_ref(c),
            None => &Cohort::ALL,
        };

        let mut records = Vec::new();
        for &cohort in cohorts {
            for track in Track::ALL {
                records.extend(self.load_source(cohort, track));
            }
        }
        records
    }

    fn source_path(&self, cohort: Cohort, track: Track) -> PathBuf {
        self.dir
            .join(format!("{}_{}.csv", cohort.file_stem(), track.as_str()))
    }

    /// A missing export file is an empty source, not an error. Rows that do
    /// not carry all three columns are skipped.
    fn load_source(&self, cohort: Cohort, track: Track) -> Vec<IdentityRecord> {
        let path = self.source_path(cohort, track);
        let Ok(contents) = std::fs::read_to_string(&path) else {
            return Vec::new();
        };

        contents
            .lines()
            .filter_map(|line| self.parse_row(line, cohort, track))
            .collect()
    }

    fn parse_row(&self, line: &str, cohort: Cohort, track: Track) -> Option<IdentityRecord> {
        let mut cells = line.split(';').map(str::trim);
        let student_id = cells.next().filter(|c| !c.is_empty())?;
        let family_name = cells.next().filter(|c| !c.is_empty())?;
        let given_name = cells.next().filter(|c| !c.is_empty())?;

        Some(IdentityRecord {
            student_id: student_id.to_string(),
            given_name: given_name.to_string(),
            family_name: family_name.to_string(),
            email: format!(
                "{}.{}@{}",
                mail_slug(given_name),
                mail_slug(family_name),
                self.email_domain
            ),
            cohort,
            track,
        })
    }
}

fn mail_slug(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}
