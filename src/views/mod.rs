pub(crate) mod bar;
