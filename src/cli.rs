use clap::builder::FalseyValueParser;
use clap::{Parser, ValueEnum};

#[derive(Parser, Debug)]
#[command(name = "vault-admin")]
#[command(author = "Alberto Cavalcante")]
#[command(about = "Sync Vault configuration from a directory of files", long_about = None)]
#[command(disable_version_flag = true)]
pub struct Cli {
    /// Directory holding the desired configuration
    #[arg(short = 'c', long, env = "CONFIGURATION_PATH")]
    pub configuration_path: Option<String>,

    /// Server address, e.g. https://vault.example.com:8200
    #[arg(short = 'a', long, env = "VAULT_ADDR")]
    pub vault_addr: Option<String>,

    /// Token used for every request
    #[arg(short = 't', long, env = "VAULT_TOKEN", hide_env_values = true)]
    pub vault_token: Option<String>,

    /// Skip TLS certificate verification
    #[arg(short = 'K', long, env = "VAULT_SKIP_VERIFY", value_parser = FalseyValueParser::new())]
    pub skip_verify: bool,

    /// Path holding the secrets used for `%{name}%` substitution
    #[arg(
        short = 's',
        long,
        env = "VAULT_SECRET_BASE_PATH",
        default_value = "secret/vault-admin/"
    )]
    pub vault_secret_base_path: String,

    /// Number of concurrent workers
    #[arg(short = 'n', long, default_value_t = reconcile::DEFAULT_WORKERS)]
    pub concurrent: usize,

    /// Enable debug logging
    #[arg(short, long, env = "DEBUG", value_parser = FalseyValueParser::new())]
    pub debug: bool,

    /// Print the version and exit
    #[arg(short = 'v', long)]
    pub version: bool,

    /// Rotate root credentials of all AWS secrets engines instead of syncing
    #[arg(short = 'r', long)]
    pub rotate_creds: bool,

    /// How to answer deletion prompts
    #[arg(long, value_enum, default_value_t = ConfirmMode::Interactive)]
    pub confirm: ConfirmMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfirmMode {
    /// Ask on the terminal
    Interactive,
    /// Approve every deletion
    AlwaysApprove,
    /// Decline every deletion
    AlwaysDeny,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_command_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_short_flags() {
        let cli = Cli::try_parse_from([
            "vault-admin",
            "-c",
            "/etc/vault-admin",
            "-a",
            "https://vault:8200",
            "-t",
            "s.abc",
            "-K",
            "-n",
            "8",
            "-d",
        ])
        .unwrap();
        assert_eq!(cli.configuration_path.as_deref(), Some("/etc/vault-admin"));
        assert_eq!(cli.vault_addr.as_deref(), Some("https://vault:8200"));
        assert_eq!(cli.vault_token.as_deref(), Some("s.abc"));
        assert!(cli.skip_verify);
        assert_eq!(cli.concurrent, 8);
        assert!(cli.debug);
        assert!(!cli.rotate_creds);
    }

    #[test]
    fn test_version_and_rotate_flags() {
        let cli = Cli::try_parse_from(["vault-admin", "-v"]).unwrap();
        assert!(cli.version);

        let cli = Cli::try_parse_from(["vault-admin", "--rotate-creds"]).unwrap();
        assert!(cli.rotate_creds);
    }

    #[test]
    fn test_confirm_modes() {
        let cli = Cli::try_parse_from(["vault-admin", "--confirm", "always-deny"]).unwrap();
        assert_eq!(cli.confirm, ConfirmMode::AlwaysDeny);

        let cli = Cli::try_parse_from(["vault-admin", "--confirm", "always-approve"]).unwrap();
        assert_eq!(cli.confirm, ConfirmMode::AlwaysApprove);

        assert!(Cli::try_parse_from(["vault-admin", "--confirm", "sometimes"]).is_err());
    }
}
