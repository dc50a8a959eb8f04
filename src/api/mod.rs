pub mod cluster;
pub mod cluster_registration_token;
pub mod condition;
pub mod management_cluster;
