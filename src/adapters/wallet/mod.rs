pub mod http_wallet;
