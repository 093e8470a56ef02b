//! Steampipe schema catalogue
//!
//! Read-only tables that ground every generated query: the tables the
//! planner may use, worked example queries, and keyword-matched fallback
//! steps that only ever name catalogued tables.

use crate::cloud::CloudProvider;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

const AWS_TABLES: &[&str] = &[
    "aws_account",
    "aws_ec2_instance",
    "aws_s3_bucket",
    "aws_iam_user",
    "aws_iam_role",
    "aws_iam_policy",
    "aws_lambda_function",
    "aws_rds_db_instance",
    "aws_vpc",
    "aws_vpc_security_group",
    "aws_vpc_subnet",
    "aws_cloudwatch_log_group",
    "aws_cloudtrail_trail",
    "aws_config_configuration_recorder",
    "aws_ebs_volume",
    "aws_ebs_snapshot",
    "aws_ecs_cluster",
    "aws_ecs_service",
    "aws_eks_cluster",
    "aws_elasticache_cluster",
    "aws_kinesis_stream",
    "aws_sns_topic",
    "aws_sqs_queue",
    "aws_dynamodb_table",
    "aws_api_gateway_rest_api",
    "aws_cloudfront_distribution",
    "aws_route53_zone",
    "aws_acm_certificate",
    "aws_kms_key",
    "aws_secretsmanager_secret",
];

const AZURE_TABLES: &[&str] = &[
    "azure_subscription",
    "azure_compute_virtual_machine",
    "azure_storage_account",
    "azure_storage_container",
    "azure_app_service_web_app",
    "azure_sql_database",
    "azure_key_vault",
    "azure_network_virtual_network",
    "azure_network_security_group",
    "azure_cosmosdb_account",
    "azure_kubernetes_cluster",
];

const GCP_TABLES: &[&str] = &[
    "gcp_project",
    "gcp_compute_instance",
    "gcp_storage_bucket",
    "gcp_sql_database_instance",
    "gcp_kubernetes_cluster",
    "gcp_compute_network",
    "gcp_compute_firewall",
    "gcp_iam_service_account",
    "gcp_bigquery_dataset",
    "gcp_pubsub_topic",
];

const AWS_EXAMPLES: &[(&str, &str)] = &[
    ("Check account info", "SELECT account_id, arn FROM aws_account"),
    ("Count S3 buckets", "SELECT COUNT(*) as bucket_count FROM aws_s3_bucket"),
    ("List S3 buckets", "SELECT name, region FROM aws_s3_bucket LIMIT 10"),
    (
        "Check S3 encryption",
        "SELECT name, server_side_encryption_configuration FROM aws_s3_bucket LIMIT 5",
    ),
    ("Count EC2 instances", "SELECT COUNT(*) as instance_count FROM aws_ec2_instance"),
    (
        "Count running EC2s",
        "SELECT COUNT(*) as running_count FROM aws_ec2_instance WHERE instance_state = 'running'",
    ),
    (
        "List EC2 instances",
        "SELECT instance_id, instance_type, instance_state, region, vpc_id FROM aws_ec2_instance",
    ),
    (
        "EC2 security groups",
        "SELECT i.instance_id, sg->>'GroupId' as group_id FROM aws_ec2_instance i, jsonb_array_elements(i.security_groups) as sg",
    ),
    (
        "List IAM users",
        "SELECT name, create_date, mfa_enabled, password_last_used FROM aws_iam_user",
    ),
    (
        "IAM users without MFA",
        "SELECT name, create_date FROM aws_iam_user WHERE NOT mfa_enabled",
    ),
    ("List IAM roles", "SELECT name, arn, create_date FROM aws_iam_role"),
    (
        "List IAM policies",
        "SELECT name, arn, attachment_count FROM aws_iam_policy WHERE is_attachable = true",
    ),
    (
        "Public RDS instances",
        "SELECT db_instance_identifier, engine FROM aws_rds_db_instance WHERE publicly_accessible = true",
    ),
];

const AZURE_EXAMPLES: &[(&str, &str)] = &[
    ("List VMs", "SELECT name, location, vm_size FROM azure_compute_virtual_machine"),
    (
        "Check storage encryption",
        "SELECT name, encryption FROM azure_storage_account",
    ),
    (
        "List SQL databases",
        "SELECT name, edition, service_level_objective FROM azure_sql_database",
    ),
];

const GCP_EXAMPLES: &[(&str, &str)] = &[
    (
        "List compute instances",
        "SELECT name, machine_type, status FROM gcp_compute_instance",
    ),
    (
        "Check bucket permissions",
        "SELECT name, location, storage_class FROM gcp_storage_bucket",
    ),
    (
        "List Kubernetes clusters",
        "SELECT name, location, status FROM gcp_kubernetes_cluster",
    ),
];

/// Canned step used when planning fails and the objective mentions one of
/// `keywords`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FallbackRule {
    pub keywords: &'static [&'static str],
    pub table: &'static str,
    pub description: &'static str,
    pub query: &'static str,
    pub expected_insights: &'static str,
}

const AWS_FALLBACKS: &[FallbackRule] = &[
    FallbackRule {
        keywords: &["ec2", "instance"],
        table: "aws_ec2_instance",
        description: "Inventory of EC2 instances",
        query: "SELECT instance_id, instance_type, instance_state, region, vpc_id FROM aws_ec2_instance",
        expected_insights: "Instance types, states and network placement",
    },
    FallbackRule {
        keywords: &["s3", "bucket"],
        table: "aws_s3_bucket",
        description: "Inventory of S3 buckets",
        query: "SELECT name, region, creation_date FROM aws_s3_bucket",
        expected_insights: "Bucket names, regions and age",
    },
    FallbackRule {
        keywords: &["iam", "mfa", "user"],
        table: "aws_iam_user",
        description: "IAM users and MFA status",
        query: "SELECT name, create_date, mfa_enabled FROM aws_iam_user",
        expected_insights: "Users lacking MFA",
    },
    FallbackRule {
        keywords: &["rds", "database"],
        table: "aws_rds_db_instance",
        description: "Inventory of RDS instances",
        query: "SELECT db_instance_identifier, engine, db_instance_class, publicly_accessible FROM aws_rds_db_instance",
        expected_insights: "Database engines and public exposure",
    },
];

const AZURE_FALLBACKS: &[FallbackRule] = &[
    FallbackRule {
        keywords: &["vm", "virtual machine", "instance"],
        table: "azure_compute_virtual_machine",
        description: "Inventory of virtual machines",
        query: "SELECT name, location, vm_size FROM azure_compute_virtual_machine",
        expected_insights: "VM sizes and locations",
    },
    FallbackRule {
        keywords: &["storage", "blob"],
        table: "azure_storage_account",
        description: "Storage account encryption",
        query: "SELECT name, encryption FROM azure_storage_account",
        expected_insights: "Encryption settings per storage account",
    },
];

const GCP_FALLBACKS: &[FallbackRule] = &[
    FallbackRule {
        keywords: &["compute", "instance", "vm"],
        table: "gcp_compute_instance",
        description: "Inventory of compute instances",
        query: "SELECT name, machine_type, status FROM gcp_compute_instance",
        expected_insights: "Machine types and status",
    },
    FallbackRule {
        keywords: &["bucket", "storage"],
        table: "gcp_storage_bucket",
        description: "Inventory of storage buckets",
        query: "SELECT name, location, storage_class FROM gcp_storage_bucket",
        expected_insights: "Bucket locations and storage classes",
    },
];

pub fn tables(provider: CloudProvider) -> &'static [&'static str] {
    match provider {
        CloudProvider::Aws => AWS_TABLES,
        CloudProvider::Azure => AZURE_TABLES,
        CloudProvider::Gcp => GCP_TABLES,
    }
}

pub fn examples(provider: CloudProvider) -> &'static [(&'static str, &'static str)] {
    match provider {
        CloudProvider::Aws => AWS_EXAMPLES,
        CloudProvider::Azure => AZURE_EXAMPLES,
        CloudProvider::Gcp => GCP_EXAMPLES,
    }
}

/// Account-level table that exists for every connection of the provider.
pub fn default_table(provider: CloudProvider) -> &'static str {
    match provider {
        CloudProvider::Aws => "aws_account",
        CloudProvider::Azure => "azure_subscription",
        CloudProvider::Gcp => "gcp_project",
    }
}

pub fn fallback_rules(provider: CloudProvider) -> &'static [FallbackRule] {
    match provider {
        CloudProvider::Aws => AWS_FALLBACKS,
        CloudProvider::Azure => AZURE_FALLBACKS,
        CloudProvider::Gcp => GCP_FALLBACKS,
    }
}

pub fn is_known_table(provider: CloudProvider, table: &str) -> bool {
    tables(provider).contains(&table)
}

fn table_reference_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:from|join)\s+([a-z_][a-z0-9_]*(?:\.[a-z_][a-z0-9_]*)?)")
            .expect("valid regex")
    })
}

/// Provider-prefixed table names referenced after FROM/JOIN.
///
/// Table functions such as `jsonb_array_elements(...)` and
/// `information_schema` lookups are not provider tables and are skipped.
pub fn referenced_tables(provider: CloudProvider, query: &str) -> BTreeSet<String> {
    let prefix = format!("{}_", provider.as_str());
    table_reference_regex()
        .captures_iter(query)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_lowercase())
        .filter(|name| name.starts_with(&prefix))
        .collect()
}

/// Allow-list and worked examples handed to the planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaHints {
    pub provider: CloudProvider,
    pub tables: Vec<&'static str>,
    pub examples: Vec<(&'static str, &'static str)>,
}

impl SchemaHints {
    pub fn for_provider(provider: CloudProvider) -> Self {
        Self {
            provider,
            tables: tables(provider).to_vec(),
            examples: examples(provider).to_vec(),
        }
    }

    pub fn allows(&self, table: &str) -> bool {
        self.tables.iter().any(|t| *t == table)
    }

    /// Tables referenced by `query` that are not on the allow-list.
    pub fn unknown_tables(&self, query: &str) -> Vec<String> {
        referenced_tables(self.provider, query)
            .into_iter()
            .filter(|t| !self.allows(t))
            .collect()
    }
}
