use clap::ValueEnum;
use namelock_messenger::MessengerClientVariant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliMessengerClient {
    Auto,
    FcaUnofficial,
    Ws3Fca,
}

impl From<CliMessengerClient> for MessengerClientVariant {
    fn from(value: CliMessengerClient) -> Self {
        match value {
            CliMessengerClient::Auto => MessengerClientVariant::Auto,
            CliMessengerClient::FcaUnofficial => MessengerClientVariant::FcaUnofficial,
            CliMessengerClient::Ws3Fca => MessengerClientVariant::Ws3Fca,
        }
    }
}
