pub mod yubico_client;
