//! BIDS-style derivative naming
//!
//! Builds output file names and directory prefixes from subject entities and
//! a fixed, ordered set of descriptor fields. Unset fields are omitted, so the
//! same entities and descriptors always produce the same name.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Identifiers of one acquisition group, rendered in `sub`, `ses`, `run` order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Entities {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ses: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run: Option<String>,
}

impl Entities {
    pub fn new(sub: impl Into<String>) -> Self {
        Entities { sub: sub.into(), ses: None, run: None }
    }

    pub fn with_ses(mut self, ses: impl Into<String>) -> Self {
        self.ses = Some(ses.into());
        self
    }

    pub fn with_run(mut self, run: impl Into<String>) -> Self {
        self.run = Some(run.into());
        self
    }

    /// Key-value pairs in naming order.
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = vec![("sub", self.sub.as_str())];
        if let Some(ses) = &self.ses {
            pairs.push(("ses", ses));
        }
        if let Some(run) = &self.run {
            pairs.push(("run", run));
        }
        pairs
    }
}

impl fmt::Display for Entities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<String> = self.pairs().iter().map(|(k, v)| format!("{k}-{v}")).collect();
        f.write_str(&joined.join("_"))
    }
}

/// A derivative name under construction.
///
/// Stages start from a base (entities plus datatype) and clone it for each
/// output, setting only the descriptors that distinguish that output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BidsName {
    entities: Entities,
    datatype: Option<String>,
    space: Option<String>,
    res: Option<String>,
    method: Option<String>,
    algorithm: Option<String>,
    param: Option<String>,
    meas: Option<String>,
    desc: Option<String>,
    suffix: Option<String>,
    ext: Option<String>,
}

macro_rules! descriptor {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        pub fn $name(mut self, value: impl Into<String>) -> Self {
            self.$name = Some(value.into());
            self
        }
    };
}

impl BidsName {
    pub fn new(entities: &Entities) -> Self {
        BidsName {
            entities: entities.clone(),
            datatype: None,
            space: None,
            res: None,
            method: None,
            algorithm: None,
            param: None,
            meas: None,
            desc: None,
            suffix: None,
            ext: None,
        }
    }

    descriptor!(
        /// Datatype directory (e.g. `dwi`); only affects [`BidsName::directory`].
        datatype
    );
    descriptor!(space);
    descriptor!(res);
    descriptor!(method);
    descriptor!(
        /// Rendered as the `alg-` entity.
        algorithm
    );
    descriptor!(param);
    descriptor!(meas);
    descriptor!(desc);
    descriptor!(suffix);
    descriptor!(
        /// Extension including the leading dot (e.g. `.nii.gz`).
        ext
    );

    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    /// File name, e.g. `sub-01_ses-A_desc-denoise_dwi.nii.gz`.
    pub fn filename(&self) -> String {
        let descriptors = [
            ("space", &self.space),
            ("res", &self.res),
            ("method", &self.method),
            ("alg", &self.algorithm),
            ("param", &self.param),
            ("meas", &self.meas),
            ("desc", &self.desc),
        ];

        let mut parts: Vec<String> = self
            .entities
            .pairs()
            .iter()
            .map(|(k, v)| format!("{k}-{v}"))
            .collect();
        for (key, value) in descriptors {
            if let Some(value) = value {
                parts.push(format!("{key}-{value}"));
            }
        }
        if let Some(suffix) = &self.suffix {
            parts.push(suffix.clone());
        }

        let mut name = parts.join("_");
        if let Some(ext) = &self.ext {
            name.push_str(ext);
        }
        name
    }

    /// Entity-derived directory prefix, e.g. `sub-01/ses-A/dwi`.
    pub fn directory(&self) -> PathBuf {
        let mut dir = PathBuf::from(format!("sub-{}", self.entities.sub));
        if let Some(ses) = &self.entities.ses {
            dir.push(format!("ses-{ses}"));
        }
        if let Some(datatype) = &self.datatype {
            dir.push(datatype);
        }
        dir
    }

    /// Directory prefix joined with the file name.
    pub fn relative_path(&self) -> PathBuf {
        self.directory().join(self.filename())
    }
}
