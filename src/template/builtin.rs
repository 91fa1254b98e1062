//! Packaged dialect definitions

pub(crate) const DEFINITIONS: &[(&str, &str)] = &[
    ("dialects/cobalt.toml", include_str!("../../dialects/cobalt.toml")),
    ("dialects/slurm.toml", include_str!("../../dialects/slurm.toml")),
    ("dialects/pbs.toml", include_str!("../../dialects/pbs.toml")),
    ("dialects/lsf.toml", include_str!("../../dialects/lsf.toml")),
];
