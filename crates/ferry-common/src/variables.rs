//! Names of the internal variables the dispatcher maintains.

pub const INTERNAL_VARIABLE_PREFIX: &str = "Internal";

pub const INTERNAL_PIPELINE_NAME: &str = "Internal.Pipeline.Name";
pub const INTERNAL_PIPELINE_FILENAME_DIRECTORY: &str = "Internal.Pipeline.Filename.Directory";
pub const INTERNAL_PIPELINE_FILENAME_NAME: &str = "Internal.Pipeline.Filename.Name";
pub const INTERNAL_PIPELINE_REPOSITORY_DIRECTORY: &str = "Internal.Pipeline.Repository.Directory";
pub const INTERNAL_ENTRY_CURRENT_DIRECTORY: &str = "Internal.Entry.Current.Directory";

pub const INTERNAL_CLUSTER_RUN_ID: &str = "Internal.Cluster.Run.ID";
pub const INTERNAL_CLUSTER_SIZE: &str = "Internal.Cluster.Size";
pub const INTERNAL_CLUSTER_MASTER: &str = "Internal.Cluster.Master";
pub const INTERNAL_SLAVE_SERVER_NUMBER: &str = "Internal.Slave.Server.Number";
pub const INTERNAL_SLAVE_SERVER_NAME: &str = "Internal.Slave.Server.Name";

/// Internal variables a pipeline exposes whose current values travel with
/// every remote or clustered submission.
pub const INTERNAL_PIPELINE_VARIABLES: &[&str] = &[
    INTERNAL_ENTRY_CURRENT_DIRECTORY,
    INTERNAL_PIPELINE_FILENAME_DIRECTORY,
    INTERNAL_PIPELINE_FILENAME_NAME,
    INTERNAL_PIPELINE_NAME,
    INTERNAL_PIPELINE_REPOSITORY_DIRECTORY,
];
