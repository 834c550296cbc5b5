pub mod sale_item_reader;
